//! Default hospitals written into an empty collection

use super::model::{BloodType, Inventory, InventoryRecord};

/// Per-type counts in `BloodType::ALL` order: A+ A- B+ B- AB+ AB- O+ O-
const DEFAULT_HOSPITALS: [(&str, &str, &str, [u32; 8]); 3] = [
    ("hospital-A", "City General Hospital", "Mumbai", [25, 12, 30, 8, 5, 3, 50, 20]),
    ("hospital-B", "Community Health Center", "Delhi", [10, 5, 15, 2, 2, 1, 25, 10]),
    ("hospital-C", "Regional Trauma Center", "Bangalore", [50, 20, 40, 10, 8, 5, 80, 40]),
];

/// The fixed dataset used to seed a fresh deployment
pub fn default_records() -> Vec<InventoryRecord> {
    DEFAULT_HOSPITALS
        .iter()
        .map(|(id, name, location, counts)| {
            let inventory: Inventory = BloodType::ALL.into_iter().zip(counts.iter().copied()).collect();
            InventoryRecord::new(*id, *name, *location, inventory)
        })
        .collect()
}
