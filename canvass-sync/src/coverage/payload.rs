//! Registration payload sent to the coverage service

use crate::photos::PhotoUrlTemplate;
use canvass_common::Submission;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// Body of `POST /api/check-coverage`
///
/// Locality and coordinate components that could not be parsed are sent as
/// empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationPayload {
    pub reference_id: Uuid,
    pub customer_name: String,
    pub address: String,
    pub house_number: String,
    pub building_type: String,
    pub salesperson: String,
    pub remarks: String,
    pub postal_code: String,
    pub village: String,
    pub subdistrict: String,
    pub city: String,
    pub province: String,
    pub latitude: String,
    pub longitude: String,
    pub photos: Vec<String>,
}

impl RegistrationPayload {
    pub fn from_submission(submission: &Submission, photo_urls: &PhotoUrlTemplate) -> Self {
        let locality = &submission.locality;
        let coordinates = &submission.coordinates;

        let mut missing = locality.missing();
        missing.extend(coordinates.missing());
        if !missing.is_empty() {
            warn!(
                submission_id = %submission.id,
                missing = ?missing,
                locality = %submission.locality_raw,
                coordinates = %submission.coordinates_raw,
                "Incomplete location data; sending empty values to coverage service"
            );
        }

        let text = |value: &Option<String>| value.clone().unwrap_or_default();

        Self {
            reference_id: submission.id,
            customer_name: submission.customer_name.clone(),
            address: submission.customer_address.clone(),
            house_number: submission.house_number.clone(),
            building_type: submission.building_type.clone(),
            salesperson: submission.salesperson.clone(),
            remarks: submission.remarks.clone(),
            postal_code: text(&locality.postal_code),
            village: text(&locality.village),
            subdistrict: text(&locality.district),
            city: text(&locality.city),
            province: text(&locality.province),
            latitude: text(&coordinates.latitude),
            longitude: text(&coordinates.longitude),
            photos: photo_urls.urls(&submission.photos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvass_common::NewSubmission;
    use chrono::Utc;

    fn submission(locality: &str, coordinates: &str) -> Submission {
        NewSubmission {
            salesperson: "Dewi".to_string(),
            customer_name: "Budi".to_string(),
            customer_address: "Jl. Merdeka".to_string(),
            house_number: "12A".to_string(),
            locality: locality.to_string(),
            coordinates: coordinates.to_string(),
            building_type: "House".to_string(),
            operators: vec!["FS".to_string(), "other".to_string()],
            remarks: None,
            photos: vec!["front.jpg".to_string()],
        }
        .into_submission(Utc::now())
        .unwrap()
    }

    #[test]
    fn test_payload_splits_locality_and_coordinates() {
        let submission = submission("12345,VillageX,DistrictY,CityZ,ProvinceW", "1.0,2.0");
        let payload =
            RegistrationPayload::from_submission(&submission, &PhotoUrlTemplate::new("http://h", "api"));

        assert_eq!(payload.postal_code, "12345");
        assert_eq!(payload.village, "VillageX");
        assert_eq!(payload.subdistrict, "DistrictY");
        assert_eq!(payload.city, "CityZ");
        assert_eq!(payload.province, "ProvinceW");
        assert_eq!(payload.latitude, "1.0");
        assert_eq!(payload.longitude, "2.0");
        assert_eq!(payload.photos.len(), 1);
        assert!(payload.photos[0].ends_with("/photos/front.jpg"));
    }

    #[test]
    fn test_payload_degrades_short_locality_to_empty() {
        let submission = submission("12345,VillageX", "1.0");
        let payload =
            RegistrationPayload::from_submission(&submission, &PhotoUrlTemplate::new("http://h", ""));

        assert_eq!(payload.village, "VillageX");
        assert_eq!(payload.subdistrict, "");
        assert_eq!(payload.province, "");
        assert_eq!(payload.longitude, "");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["city"], "");
        assert_eq!(json["reference_id"], submission.id.to_string());
    }
}
