use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::marker::{validate_marker_map, MarkerError, MarkerMap};
use crate::core::types::KitId;

pub const MAX_KIT_LEN: usize = 20;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_COUNTRY_LEN: usize = 50;
pub const MAX_HAPLOGROUP_LEN: usize = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Kit number is required")]
    MissingKit,

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error(transparent)]
    Marker(#[from] MarkerError),
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ProfileError> {
    if value.chars().count() > max {
        return Err(ProfileError::TooLong { field, max });
    }
    Ok(())
}

/// A Y-STR profile in the reference population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique kit identifier
    pub kit_number: KitId,

    /// Display name (may be empty)
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub country: String,

    /// Haplogroup label, e.g. `R1b1a2` or `R-M269` (may be empty)
    #[serde(default)]
    pub haplogroup: String,

    /// Marker name -> validated value; never empty
    pub markers: MarkerMap,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(kit_number: impl Into<KitId>, markers: MarkerMap) -> Self {
        let now = Utc::now();
        Self {
            kit_number: kit_number.into(),
            name: String::new(),
            country: String::new(),
            haplogroup: String::new(),
            markers,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    #[must_use]
    pub fn with_haplogroup(mut self, haplogroup: impl Into<String>) -> Self {
        self.haplogroup = haplogroup.into();
        self
    }

    /// Check the profile invariant (non-blank kit, field lengths, at least
    /// one marker, every value valid) and normalize the kit and marker values
    /// in place.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&mut self) -> Result<(), ProfileError> {
        let kit = self.kit_number.as_str().trim();
        if kit.is_empty() {
            return Err(ProfileError::MissingKit);
        }
        check_len("kit number", kit, MAX_KIT_LEN)?;
        if kit.len() != self.kit_number.as_str().len() {
            self.kit_number = KitId::new(kit);
        }
        check_len("name", &self.name, MAX_NAME_LEN)?;
        check_len("country", &self.country, MAX_COUNTRY_LEN)?;
        check_len("haplogroup", &self.haplogroup, MAX_HAPLOGROUP_LEN)?;
        self.markers = validate_marker_map(&self.markers)?;
        Ok(())
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

/// Partial update of a profile: only the fields present are applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub haplogroup: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<MarkerMap>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.country.is_none()
            && self.haplogroup.is_none()
            && self.markers.is_none()
    }

    /// Check field lengths and normalize the marker part of the patch, if any.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&mut self) -> Result<(), ProfileError> {
        if let Some(name) = &self.name {
            check_len("name", name, MAX_NAME_LEN)?;
        }
        if let Some(country) = &self.country {
            check_len("country", country, MAX_COUNTRY_LEN)?;
        }
        if let Some(haplogroup) = &self.haplogroup {
            check_len("haplogroup", haplogroup, MAX_HAPLOGROUP_LEN)?;
        }
        if let Some(markers) = &self.markers {
            self.markers = Some(validate_marker_map(markers)?);
        }
        Ok(())
    }

    /// Apply the present fields to `profile` and refresh its update time
    pub fn apply(&self, profile: &mut Profile, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            profile.name.clone_from(name);
        }
        if let Some(country) = &self.country {
            profile.country.clone_from(country);
        }
        if let Some(haplogroup) = &self.haplogroup {
            profile.haplogroup.clone_from(haplogroup);
        }
        if let Some(markers) = &self.markers {
            profile.markers.clone_from(markers);
        }
        profile.updated_at = now;
    }
}

/// One entry of a bulk submission, before any cleaning.
///
/// Marker values are kept as raw JSON so numbers (`13`) and strings (`"13"`)
/// are both accepted; anything else is dropped during cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSubmission {
    #[serde(alias = "kitNumber")]
    pub kit_number: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub haplogroup: Option<String>,

    #[serde(default)]
    pub markers: BTreeMap<String, serde_json::Value>,
}

impl ProfileSubmission {
    pub fn new(kit_number: impl Into<String>) -> Self {
        Self {
            kit_number: kit_number.into(),
            name: None,
            country: None,
            haplogroup: None,
            markers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.markers.insert(marker.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_haplogroup(mut self, haplogroup: impl Into<String>) -> Self {
        self.haplogroup = Some(haplogroup.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(pairs: &[(&str, &str)]) -> MarkerMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_validate_normalizes_values() {
        let mut profile = Profile::new("K1", markers(&[("DYS393", " 13 ")]));
        profile.validate().unwrap();
        assert_eq!(profile.markers["DYS393"], "13");
    }

    #[test]
    fn test_validate_rejects_empty_markers() {
        let mut profile = Profile::new("K1", MarkerMap::new());
        assert_eq!(
            profile.validate().unwrap_err(),
            ProfileError::Marker(MarkerError::NoMarkers)
        );
    }

    #[test]
    fn test_validate_enforces_field_lengths() {
        let mut profile = Profile::new("  B1234 ", markers(&[("DYS393", "13")]));
        profile.validate().unwrap();
        assert_eq!(profile.kit_number, KitId::from("B1234"));

        let mut blank = Profile::new("   ", markers(&[("DYS393", "13")]));
        assert_eq!(blank.validate().unwrap_err(), ProfileError::MissingKit);

        let mut long_kit = Profile::new("K".repeat(21), markers(&[("DYS393", "13")]));
        assert!(matches!(
            long_kit.validate().unwrap_err(),
            ProfileError::TooLong { field: "kit number", max: MAX_KIT_LEN }
        ));

        let mut long_name =
            Profile::new("K1", markers(&[("DYS393", "13")])).with_name("x".repeat(101));
        assert!(long_name.validate().is_err());

        let mut patch = ProfilePatch {
            haplogroup: Some("R".repeat(51)),
            ..ProfilePatch::default()
        };
        assert_eq!(
            patch.validate().unwrap_err(),
            ProfileError::TooLong { field: "haplogroup", max: MAX_HAPLOGROUP_LEN }
        );
    }

    #[test]
    fn test_patch_applies_present_fields_only() {
        let mut profile = Profile::new("K1", markers(&[("DYS393", "13")]))
            .with_name("Smith")
            .with_country("Ireland");
        let before = profile.updated_at;

        let patch = ProfilePatch {
            country: Some("Scotland".to_string()),
            ..ProfilePatch::default()
        };
        let later = before + chrono::Duration::seconds(5);
        patch.apply(&mut profile, later);

        assert_eq!(profile.name, "Smith");
        assert_eq!(profile.country, "Scotland");
        assert_eq!(profile.updated_at, later);
        assert_eq!(profile.markers["DYS393"], "13");
    }

    #[test]
    fn test_empty_patch() {
        assert!(ProfilePatch::default().is_empty());
        let patch = ProfilePatch {
            haplogroup: Some(String::new()),
            ..ProfilePatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_submission_accepts_camel_case_kit() {
        let json = r#"{"kitNumber": "B123", "markers": {"DYS393": 13, "DYS390": "24"}}"#;
        let submission: ProfileSubmission = serde_json::from_str(json).unwrap();
        assert_eq!(submission.kit_number, "B123");
        assert_eq!(submission.markers.len(), 2);
        assert!(submission.name.is_none());
    }
}
