//! Structured locality and coordinate values
//!
//! Field apps send the locality as a comma-joined tuple
//! `postal code, village, district, city, province` and coordinates as `lat,lon`.
//! Both are parsed once at ingestion time into named fields. Components that are
//! absent or blank are kept as `None` and reported through `missing()`, so callers
//! can decide how to degrade instead of silently shifting positions.

use serde::{Deserialize, Serialize};

/// Parsed locality descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    pub postal_code: Option<String>,
    pub village: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
}

impl Locality {
    /// Number of positional components in a locality descriptor
    pub const COMPONENTS: usize = 5;

    /// Parse a comma-joined locality descriptor.
    ///
    /// Never fails: missing components become `None`. Components past the fifth
    /// are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split(',').map(clean);

        Self {
            postal_code: parts.next().flatten(),
            village: parts.next().flatten(),
            district: parts.next().flatten(),
            city: parts.next().flatten(),
            province: parts.next().flatten(),
        }
    }

    /// Names of the components that could not be read from the descriptor
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("postal_code", &self.postal_code),
            ("village", &self.village),
            ("district", &self.district),
            ("city", &self.city),
            ("province", &self.province),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Parsed `lat,lon` pair, kept as the strings the field app sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl Coordinates {
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split(',').map(clean);

        Self {
            latitude: parts.next().flatten(),
            longitude: parts.next().flatten(),
        }
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.latitude.is_none() {
            missing.push("latitude");
        }
        if self.longitude.is_none() {
            missing.push("longitude");
        }
        missing
    }
}

fn clean(part: &str) -> Option<String> {
    let trimmed = part.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
