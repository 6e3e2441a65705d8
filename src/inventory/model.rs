//! Inventory data model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The eight tracked blood groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::APositive,
        BloodType::ANegative,
        BloodType::BPositive,
        BloodType::BNegative,
        BloodType::AbPositive,
        BloodType::AbNegative,
        BloodType::OPositive,
        BloodType::ONegative,
    ];

    /// Wire code, e.g. `AB-`
    pub fn code(&self) -> &'static str {
        match self {
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown blood type code: {0}")]
pub struct UnknownBloodType(pub String);

impl FromStr for BloodType {
    type Err = UnknownBloodType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BloodType::ALL
            .into_iter()
            .find(|t| t.code() == s)
            .ok_or_else(|| UnknownBloodType(s.to_string()))
    }
}

/// Unit counts per blood type
pub type Inventory = BTreeMap<BloodType, u32>;

/// A hospital and its stock, as stored in the document collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Document id within the collection
    pub id: String,
    /// Display name, also the key users select by
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub inventory: Inventory,
}

impl InventoryRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        inventory: Inventory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            inventory,
        }
    }

    /// Units on hand for a type, `None` when the type is not tracked here
    pub fn units(&self, blood_type: BloodType) -> Option<u32> {
        self.inventory.get(&blood_type).copied()
    }
}

/// One hospital's stock of a searched blood type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub id: String,
    pub name: String,
    pub location: String,
    pub units: u32,
}

/// Hospitals holding at least one unit of `blood_type`, largest stock first
pub fn search_by_blood_type(records: &[InventoryRecord], blood_type: BloodType) -> Vec<Availability> {
    let mut hits: Vec<Availability> = records
        .iter()
        .filter_map(|r| {
            r.units(blood_type).filter(|&n| n > 0).map(|units| Availability {
                id: r.id.clone(),
                name: r.name.clone(),
                location: r.location.clone(),
                units,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| a.name.cmp(&b.name)));
    hits
}
