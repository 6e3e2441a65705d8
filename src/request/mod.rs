//! Blood withdrawal requests: validate against the cached snapshot, then
//! write the decremented count back to the hospital's record.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::inventory::{BloodType, Inventory, InventoryRecord};
use crate::store::BackendError;

const MAPS_SEARCH_BASE: &str = "https://www.google.com/maps/search/";

/// Destination for inventory writes
#[async_trait]
pub trait InventoryWriter: Send + Sync {
    async fn write_inventory(&self, record_id: &str, inventory: &Inventory) -> Result<(), WriteError>;
}

/// Raw request form. Fields arrive as strings or numbers and may be blank.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WithdrawalForm {
    #[serde(default, deserialize_with = "lenient_string")]
    pub blood_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hospital: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount: Option<String>,
}

impl WithdrawalForm {
    pub fn new(blood_type: &str, hospital: &str, amount: &str) -> Self {
        Self {
            blood_type: Some(blood_type.to_string()),
            hospital: Some(hospital.to_string()),
            amount: Some(amount.to_string()),
        }
    }
}

/// Accept `"20"`, `20` or null for a form field
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct Withdrawal<'a> {
    pub record: &'a InventoryRecord,
    pub blood_type: BloodType,
    pub amount: u32,
    pub available: u32,
}

impl Withdrawal<'_> {
    /// The record's inventory with this withdrawal applied
    pub fn updated_inventory(&self) -> Inventory {
        let mut inventory = self.record.inventory.clone();
        inventory.insert(self.blood_type, self.available - self.amount);
        inventory
    }
}

/// Form rejections, in the order they are checked
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please fill in all fields.")]
    MissingFields,

    #[error("Hospital not found.")]
    HospitalNotFound,

    #[error("This blood type is not tracked for this hospital.")]
    BloodTypeNotTracked,

    #[error("Not enough {blood_type} blood available at {hospital}. Only {available} units available.")]
    InsufficientUnits {
        blood_type: BloodType,
        hospital: String,
        available: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Failed to process request. Please try again.")]
    Backend(#[source] BackendError),

    #[error("Failed to process request. Please try again.")]
    NotSignedIn,
}

/// Outcome shown under the request form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    None,
    Success {
        message: String,
        hospital: String,
        map_url: String,
    },
    Error {
        message: String,
    },
}

impl RequestStatus {
    pub fn error(message: impl Into<String>) -> Self {
        RequestStatus::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestStatus::Success { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            RequestStatus::None => None,
            RequestStatus::Success { message, .. } | RequestStatus::Error { message } => Some(message),
        }
    }
}

/// Check a form against the snapshot. First failing check wins.
pub fn validate<'a>(
    banks: &'a [InventoryRecord],
    form: &WithdrawalForm,
) -> Result<Withdrawal<'a>, ValidationError> {
    let present = |field: &Option<String>| {
        field
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let (Some(blood_type), Some(hospital), Some(amount)) =
        (present(&form.blood_type), present(&form.hospital), present(&form.amount))
    else {
        return Err(ValidationError::MissingFields);
    };

    let amount = match amount.parse::<u64>() {
        Ok(n) if n > 0 => n,
        _ => return Err(ValidationError::MissingFields),
    };

    let record = banks
        .iter()
        .find(|b| b.name == hospital)
        .ok_or(ValidationError::HospitalNotFound)?;

    let (blood_type, available) = blood_type
        .parse::<BloodType>()
        .ok()
        .and_then(|t| record.units(t).map(|n| (t, n)))
        .ok_or(ValidationError::BloodTypeNotTracked)?;

    if amount > u64::from(available) {
        return Err(ValidationError::InsufficientUnits {
            blood_type,
            hospital: record.name.clone(),
            available,
        });
    }

    Ok(Withdrawal {
        record,
        blood_type,
        // amount <= available, so it fits
        amount: amount as u32,
        available,
    })
}

/// Map-search link for a hospital
pub fn map_search_url(hospital: &str) -> String {
    reqwest::Url::parse_with_params(MAPS_SEARCH_BASE, &[("api", "1"), ("query", hospital)])
        .map(String::from)
        .unwrap_or_else(|_| MAPS_SEARCH_BASE.to_string())
}

/// Validates requests and issues the inventory write
pub struct RequestHandler<W: ?Sized> {
    writer: std::sync::Arc<W>,
}

impl<W: ?Sized> Clone for RequestHandler<W> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
        }
    }
}

impl<W: InventoryWriter + ?Sized> RequestHandler<W> {
    pub fn new(writer: std::sync::Arc<W>) -> Self {
        Self { writer }
    }

    /// Validate and apply one request. Never retries; the confirmed count
    /// arrives later through the live subscription.
    pub async fn submit(&self, banks: &[InventoryRecord], form: &WithdrawalForm) -> RequestStatus {
        let withdrawal = match validate(banks, form) {
            Ok(w) => w,
            Err(e) => {
                info!(reason = %e, "Blood request rejected");
                return RequestStatus::error(e.to_string());
            }
        };

        let inventory = withdrawal.updated_inventory();
        if let Err(e) = self
            .writer
            .write_inventory(&withdrawal.record.id, &inventory)
            .await
        {
            warn!(hospital = %withdrawal.record.name, error = ?e, "Blood request write failed");
            return RequestStatus::error(e.to_string());
        }

        let hospital = withdrawal.record.name.clone();
        info!(
            hospital = %hospital,
            blood_type = %withdrawal.blood_type,
            amount = withdrawal.amount,
            remaining = withdrawal.available - withdrawal.amount,
            "Blood request accepted"
        );

        RequestStatus::Success {
            message: format!(
                "Successfully requested {} units of {} blood from {}. Click here to find the hospital.",
                withdrawal.amount, withdrawal.blood_type, hospital
            ),
            map_url: map_search_url(&hospital),
            hospital,
        }
    }
}
