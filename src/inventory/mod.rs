//! Hospital inventory records and the default dataset

pub mod model;
pub mod seed;

pub use model::{
    search_by_blood_type, Availability, BloodType, Inventory, InventoryRecord, UnknownBloodType,
};
pub use seed::default_records;
