// Validated Types
// Strongly-typed wrappers that enforce invariants at construction time, so
// malformed identifiers and URLs cannot silently enter the pipeline.

use crate::errors::ValidationError;
use std::fmt;

/// Vendor-agnostic city key: lowercase city name + two-letter state, e.g.
/// `paloaltoCA`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Banana(String);

impl Banana {
    /// # Invariants
    /// - At least 3 characters
    /// - ASCII only
    /// - Ends with a two-letter uppercase state code
    /// - City portion is lowercase alphanumeric
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();

        if raw.len() < 3 {
            return Err(ValidationError::invalid(
                "banana must be at least 3 characters (city name + state)",
            ));
        }
        if !raw.is_ascii() {
            return Err(ValidationError::invalid("banana must be ASCII"));
        }

        let (name_part, state_part) = raw.split_at(raw.len() - 2);
        if !state_part.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::invalid(
                "banana must end with a two-letter uppercase state code",
            ));
        }
        if name_part.is_empty()
            || !name_part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ValidationError::invalid(
                "banana city portion must be lowercase alphanumeric",
            ));
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Banana {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Banana {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Vendor platform a city is scraped through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Legistar,
    Primegov,
    Granicus,
    Civicclerk,
    Novusagenda,
    Civicplus,
    Custom,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Legistar => "legistar",
            Vendor::Primegov => "primegov",
            Vendor::Granicus => "granicus",
            Vendor::Civicclerk => "civicclerk",
            Vendor::Novusagenda => "novusagenda",
            Vendor::Civicplus => "civicplus",
            Vendor::Custom => "custom",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "legistar" => Ok(Vendor::Legistar),
            "primegov" => Ok(Vendor::Primegov),
            "granicus" => Ok(Vendor::Granicus),
            "civicclerk" => Ok(Vendor::Civicclerk),
            "novusagenda" => Ok(Vendor::Novusagenda),
            "civicplus" => Ok(Vendor::Civicplus),
            "custom" => Ok(Vendor::Custom),
            other => Err(ValidationError::invalid(format!("unknown vendor: {other}"))),
        }
    }

    /// Default per-vendor requests-per-second.
    pub fn default_rps(&self) -> f64 {
        match self {
            Vendor::Legistar => 1.0,
            Vendor::Granicus => 2.0,
            _ => 3.0,
        }
    }
}

/// A non-empty, absolute HTTP(S) URL, validated once at the adapter/extractor
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ValidatedUrl(String);

impl ValidatedUrl {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let parsed = url::Url::parse(&raw)
            .map_err(|e| ValidationError::invalid(format!("not a valid URL: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ValidationError::invalid("URL must be http(s)"));
        }
        Ok(Self(parsed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banana_accepts_wellformed_keys() {
        assert!(Banana::new("paloaltoCA").is_ok());
        assert!(Banana::new("nashvilleTN").is_ok());
    }

    #[test]
    fn banana_rejects_missing_state_code() {
        assert!(Banana::new("paloalto").is_err());
    }

    #[test]
    fn banana_rejects_uppercase_city_name() {
        assert!(Banana::new("PaloAltoCA").is_err());
    }

    #[test]
    fn vendor_round_trips_through_str() {
        for v in [
            Vendor::Legistar,
            Vendor::Primegov,
            Vendor::Granicus,
            Vendor::Civicclerk,
            Vendor::Novusagenda,
            Vendor::Civicplus,
            Vendor::Custom,
        ] {
            assert_eq!(Vendor::parse(v.as_str()).unwrap(), v);
        }
    }

    #[test]
    fn vendor_default_rps_matches_documented_defaults() {
        assert_eq!(Vendor::Legistar.default_rps(), 1.0);
        assert_eq!(Vendor::Granicus.default_rps(), 2.0);
        assert_eq!(Vendor::Primegov.default_rps(), 3.0);
    }

    #[test]
    fn validated_url_rejects_non_http_schemes() {
        assert!(ValidatedUrl::new("ftp://example.com/file.pdf").is_err());
        assert!(ValidatedUrl::new("https://example.com/file.pdf").is_ok());
    }
}
