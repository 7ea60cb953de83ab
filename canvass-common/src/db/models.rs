//! Database models

use crate::locality::{Coordinates, Locality};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operator tag that enables the FS mirror and the coverage check
pub const FS_OPERATOR: &str = "FS";

/// Maximum number of photos attached to one submission
pub const MAX_PHOTOS: usize = 5;

/// Non-empty, duplicate-free set of operator tags, in submission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OperatorSet(Vec<String>);

impl OperatorSet {
    pub fn new<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.into().trim().to_string();
            if !tag.is_empty() && !set.contains(&tag) {
                set.push(tag);
            }
        }

        if set.is_empty() {
            return Err(Error::InvalidInput(
                "operator set must contain at least one operator".to_string(),
            ));
        }

        Ok(Self(set))
    }

    pub fn includes_fs(&self) -> bool {
        self.contains(FS_OPERATOR)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn joined(&self, separator: &str) -> String {
        self.0.join(separator)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for OperatorSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tags = Vec::<String>::deserialize(deserializer)?;
        OperatorSet::new(tags).map_err(serde::de::Error::custom)
    }
}

/// Photo attached to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoReference {
    pub submission_id: Uuid,
    pub filename: String,
}

/// Which spreadsheet mirror a row or marker refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MirrorSheet {
    /// Every submission, regardless of operator
    AllOperators,
    /// Only submissions that include the FS operator
    Fs,
}

impl MirrorSheet {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorSheet::AllOperators => "all",
            MirrorSheet::Fs => "fs",
        }
    }
}

impl std::fmt::Display for MirrorSheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-submission completion markers. Each one is set once and never unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMarkers {
    pub all_mirror_written_at: Option<DateTime<Utc>>,
    pub fs_mirror_written_at: Option<DateTime<Utc>>,
    /// Correlation id from the coverage service; doubles as the "registered" flag
    pub coverage_bot_id: Option<String>,
    pub coverage_bot_finished: bool,
}

impl SyncMarkers {
    pub fn coverage_state(&self) -> CoverageState {
        match (&self.coverage_bot_id, self.coverage_bot_finished) {
            (None, _) => CoverageState::Unregistered,
            (Some(_), false) => CoverageState::Registered,
            (Some(_), true) => CoverageState::Resolved,
        }
    }
}

/// Coverage sub-lifecycle: `Unregistered -> Registered -> Resolved`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageState {
    Unregistered,
    Registered,
    Resolved,
}

/// Validated submission payload as delivered by the intake layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub salesperson: String,
    pub customer_name: String,
    pub customer_address: String,
    pub house_number: String,
    /// Comma-joined `postal code, village, district, city, province`
    pub locality: String,
    /// `lat,lon`
    pub coordinates: String,
    pub building_type: String,
    pub operators: Vec<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    /// Filenames already stored in the photo area
    #[serde(default)]
    pub photos: Vec<String>,
}

impl NewSubmission {
    /// Turn the payload into a fresh submission with a new identity.
    ///
    /// Fails only on the two invariants the store depends on: a non-empty
    /// operator set and at most [`MAX_PHOTOS`] photos.
    pub fn into_submission(self, created_at: DateTime<Utc>) -> Result<Submission> {
        let operators = OperatorSet::new(self.operators)?;

        if self.photos.len() > MAX_PHOTOS {
            return Err(Error::InvalidInput(format!(
                "{} photos attached, at most {} allowed",
                self.photos.len(),
                MAX_PHOTOS
            )));
        }

        let id = Uuid::new_v4();
        let photos = self
            .photos
            .into_iter()
            .map(|filename| PhotoReference {
                submission_id: id,
                filename,
            })
            .collect();

        Ok(Submission {
            id,
            created_at,
            salesperson: self.salesperson,
            customer_name: self.customer_name,
            customer_address: self.customer_address,
            house_number: self.house_number,
            locality: Locality::parse(&self.locality),
            locality_raw: self.locality,
            coordinates: Coordinates::parse(&self.coordinates),
            coordinates_raw: self.coordinates,
            building_type: self.building_type,
            operators,
            remarks: self.remarks.unwrap_or_default(),
            photos,
            markers: SyncMarkers::default(),
        })
    }
}

/// A stored submission with its photos and sync markers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub salesperson: String,
    pub customer_name: String,
    pub customer_address: String,
    pub house_number: String,
    pub locality_raw: String,
    pub locality: Locality,
    pub coordinates_raw: String,
    pub coordinates: Coordinates,
    pub building_type: String,
    pub operators: OperatorSet,
    pub remarks: String,
    pub photos: Vec<PhotoReference>,
    pub markers: SyncMarkers,
}

impl Submission {
    pub fn includes_fs(&self) -> bool {
        self.operators.includes_fs()
    }

    /// Street address followed by the raw locality descriptor
    pub fn full_address(&self) -> String {
        match (self.customer_address.trim(), self.locality_raw.trim()) {
            ("", locality) => locality.to_string(),
            (address, "") => address.to_string(),
            (address, locality) => format!("{}, {}", address, locality),
        }
    }
}
