//! Firestore REST document encoding
//!
//! Firestore represents every field as a single-key object naming its type,
//! e.g. `{"integerValue": "25"}` or `{"mapValue": {"fields": {...}}}`.
//! Integers travel as decimal strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::inventory::{BloodType, Inventory, InventoryRecord};

use super::BackendError;

/// A typed Firestore value. Covers every value type the REST API returns,
/// so documents carrying fields we never read still parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    /// Base64
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(LatLng),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

/// A document as returned by (or sent to) the REST API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name, `projects/.../documents/<collection>/<id>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

/// One page of `documents.list`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    pub next_page_token: Option<String>,
}

/// Encode a record's fields; the id lives in the document path, not the body
pub fn encode_record(record: &InventoryRecord) -> Document {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), Value::StringValue(record.name.clone()));
    fields.insert("location".to_string(), Value::StringValue(record.location.clone()));
    fields.insert("inventory".to_string(), encode_inventory(&record.inventory));

    Document { name: None, fields }
}

pub fn encode_inventory(inventory: &Inventory) -> Value {
    let fields = inventory
        .iter()
        .map(|(blood_type, units)| (blood_type.code().to_string(), Value::IntegerValue(units.to_string())))
        .collect();

    Value::MapValue(MapValue { fields })
}

/// Decode a listed document into a record
pub fn decode_record(document: &Document) -> Result<InventoryRecord, BackendError> {
    let id = document
        .name
        .as_deref()
        .and_then(|n| n.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BackendError::Decode("document has no name".to_string()))?
        .to_string();

    let name = string_field(&document.fields, "name").unwrap_or_default();
    let location = string_field(&document.fields, "location").unwrap_or_default();

    let inventory = match document.fields.get("inventory") {
        Some(Value::MapValue(map)) => decode_inventory(&id, map)?,
        Some(other) => {
            return Err(BackendError::Decode(format!(
                "document {id}: inventory is not a map: {other:?}"
            )))
        }
        None => Inventory::new(),
    };

    Ok(InventoryRecord {
        id,
        name,
        location,
        inventory,
    })
}

fn string_field(fields: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn decode_inventory(id: &str, map: &MapValue) -> Result<Inventory, BackendError> {
    let mut inventory = Inventory::new();

    for (code, value) in &map.fields {
        let Ok(blood_type) = code.parse::<BloodType>() else {
            warn!(document = %id, code = %code, "Ignoring unknown blood type in inventory");
            continue;
        };
        inventory.insert(blood_type, decode_units(id, code, value)?);
    }

    Ok(inventory)
}

fn decode_units(id: &str, code: &str, value: &Value) -> Result<u32, BackendError> {
    let invalid = || BackendError::Decode(format!("document {id}: invalid unit count for {code}: {value:?}"));

    match value {
        Value::IntegerValue(s) => s.parse::<u32>().map_err(|_| invalid()),
        Value::DoubleValue(d) if d.fract() == 0.0 && *d >= 0.0 && *d <= f64::from(u32::MAX) => Ok(*d as u32),
        _ => Err(invalid()),
    }
}
