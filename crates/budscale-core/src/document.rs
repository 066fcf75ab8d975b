//! Persisted form of a session.
//!
//! A [`SessionDocument`] is what the external keyed document store holds
//! for one user: the regions, the standard reference, and the declared
//! standard size. It is pushed after every mutation and may be pushed
//! back from another device at any time.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::calibration::CalibrationSettings;
use crate::types::{Region, RegionId};

/// Location of a document in the keyed store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Key of the current annotation session for `user_id` within `app_id`.
    ///
    /// Both ids are opaque; they are only used to build the path.
    #[must_use]
    pub fn session(app_id: &str, user_id: &str) -> Self {
        Self(format!(
            "artifacts/{app_id}/users/{user_id}/bud_annotations/current_session"
        ))
    }

    /// The key as a path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a session as stored externally.
///
/// Every field except `user_id` tolerates being absent so that partially
/// written documents still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Opaque owner identity.
    pub user_id: String,
    /// Regions in drawing order. Stored labels are ignored on load.
    ///
    /// Older writers stored this as a JSON-encoded string; both forms load.
    #[serde(default, deserialize_with = "annotations_from_list_or_text")]
    pub annotations: Vec<Region>,
    /// Id of the standard region, if any.
    #[serde(default)]
    pub standard_bud_id: Option<RegionId>,
    /// Declared standard width in centimetres.
    #[serde(default)]
    pub standard_width_cm: Option<f64>,
    /// Declared standard height in centimetres.
    #[serde(default)]
    pub standard_height_cm: Option<f64>,
    /// Milliseconds since the Unix epoch of the last write, set by the writer.
    #[serde(default)]
    pub last_update_ms: Option<u64>,
}

fn annotations_from_list_or_text<'de, D>(deserializer: D) -> Result<Vec<Region>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        List(Vec<Region>),
        Text(String),
    }

    match Option::<Stored>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Stored::List(regions)) => Ok(regions),
        Some(Stored::Text(text)) if text.trim().is_empty() => Ok(Vec::new()),
        Some(Stored::Text(text)) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
    }
}

impl SessionDocument {
    /// Calibration settings carried by this document.
    ///
    /// A missing, zero, negative, or non-finite value falls back to the
    /// default for that axis.
    #[must_use]
    pub fn calibration(&self) -> CalibrationSettings {
        let pick = |value: Option<f64>, default: f64, axis: &str| match value {
            Some(v) if v.is_finite() && v > 0.0 => v,
            Some(v) => {
                warn!(axis, value = v, "stored standard size is invalid; using default");
                default
            }
            None => default,
        };
        CalibrationSettings {
            width_cm: pick(
                self.standard_width_cm,
                CalibrationSettings::DEFAULT_WIDTH_CM,
                "width",
            ),
            height_cm: pick(
                self.standard_height_cm,
                CalibrationSettings::DEFAULT_HEIGHT_CM,
                "height",
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn session_key_path() {
        let key = DocumentKey::session("app", "user-1");
        assert_eq!(
            key.as_str(),
            "artifacts/app/users/user-1/bud_annotations/current_session"
        );
        assert_eq!(key.to_string(), key.as_str());
    }

    #[test]
    fn minimal_document_loads() {
        let doc: SessionDocument = serde_json::from_str(r#"{"userId":"u"}"#).unwrap();
        assert!(doc.annotations.is_empty());
        assert_eq!(doc.standard_bud_id, None);
        assert_eq!(doc.calibration(), CalibrationSettings::default());
    }

    #[test]
    fn text_encoded_annotations_load() {
        let json = r#"{
            "userId": "u",
            "annotations": "[{\"id\":\"lq9f3k2ab1x9\",\"x\":1,\"y\":2,\"w\":30,\"h\":40,\"label\":\"Bud A\"}]",
            "standardBudId": "lq9f3k2ab1x9"
        }"#;
        let doc: SessionDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.annotations.len(), 1);
        assert_eq!(doc.annotations[0].id().as_str(), "lq9f3k2ab1x9");
        assert_eq!(doc.annotations[0].rect().h, 40.0);
        assert_eq!(doc.standard_bud_id, Some("lq9f3k2ab1x9".parse().unwrap()));
    }

    #[test]
    fn null_or_blank_annotations_load_empty() {
        for json in [
            r#"{"userId":"u","annotations":null,"standardBudId":null}"#,
            r#"{"userId":"u","annotations":""}"#,
        ] {
            let doc: SessionDocument = serde_json::from_str(json).unwrap();
            assert!(doc.annotations.is_empty());
            assert_eq!(doc.standard_bud_id, None);
        }
        assert!(serde_json::from_str::<SessionDocument>(r#"{"userId":"u","annotations":"[{"}"#).is_err());
    }

    #[test]
    fn fields_are_camel_case() {
        let doc = SessionDocument {
            user_id: "u".into(),
            annotations: Vec::new(),
            standard_bud_id: Some(RegionId::from_u128(5)),
            standard_width_cm: Some(2.0),
            standard_height_cm: Some(3.0),
            last_update_ms: Some(1),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["userId"], "u");
        assert_eq!(json["standardWidthCm"], 2.0);
        assert_eq!(json["standardHeightCm"], 3.0);
        assert_eq!(json["lastUpdateMs"], 1);
        assert!(json["standardBudId"].is_string());
    }

    #[test]
    fn invalid_sizes_fall_back_per_axis() {
        let doc = SessionDocument {
            user_id: "u".into(),
            annotations: Vec::new(),
            standard_bud_id: None,
            standard_width_cm: Some(0.0),
            standard_height_cm: Some(4.5),
            last_update_ms: None,
        };
        let cal = doc.calibration();
        assert_eq!(cal.width_cm, CalibrationSettings::DEFAULT_WIDTH_CM);
        assert_eq!(cal.height_cm, 4.5);
    }
}
