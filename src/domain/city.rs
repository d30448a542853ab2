use crate::types::{Banana, Vendor};
use serde::{Deserialize, Serialize};

/// Administrative lifecycle of a city: seeded by an operator, never deleted
/// while any meeting references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CityStatus {
    Active,
    Paused,
    Disabled,
}

impl CityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CityStatus::Active => "active",
            CityStatus::Paused => "paused",
            CityStatus::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zipcode {
    pub banana: Banana,
    pub zipcode: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub banana: Banana,
    pub name: String,
    pub state: String,
    pub vendor: Vendor,
    /// Vendor-specific slug used to derive that vendor's base URL.
    pub slug: String,
    pub county: Option<String>,
    pub status: CityStatus,
    pub zipcodes: Vec<Zipcode>,
}
