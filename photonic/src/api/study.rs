use serde::Deserialize;

use crate::naming::FALLBACK_NAME;

/// One study to retrieve.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawStudy")]
pub struct StudyRecord {
    /// Patient name as reported by the portal (unsanitized).
    pub patient_name: String,
    /// Public DICOM study instance UID. Empty if the portal omitted it.
    pub study_instance_uid: String,
    /// Internal archive identifier, when already known.
    pub study_instance_uuid: Option<String>,
}

impl StudyRecord {
    pub fn new(patient_name: impl Into<String>, study_instance_uid: impl Into<String>) -> Self {
        Self {
            patient_name: patient_name.into(),
            study_instance_uid: study_instance_uid.into(),
            study_instance_uuid: None,
        }
    }

    /// Records for user-supplied UIDs, named `patient_1`, `patient_2`, ...
    pub fn from_uids<I, S>(uids: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        uids.into_iter()
            .enumerate()
            .map(|(i, uid)| Self::new(format!("{}_{}", FALLBACK_NAME, i + 1), uid))
            .collect()
    }
}

/// Worklist entry as sent by the portal, where any field may be missing or null.
#[derive(Deserialize)]
struct RawStudy {
    #[serde(default)]
    patient_name: Option<String>,
    #[serde(default)]
    study_instance_uid: Option<String>,
    #[serde(default)]
    study_instance_uuid: Option<String>,
}

impl From<RawStudy> for StudyRecord {
    fn from(raw: RawStudy) -> Self {
        Self {
            patient_name: raw
                .patient_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_NAME.to_string()),
            study_instance_uid: raw.study_instance_uid.unwrap_or_default(),
            study_instance_uuid: raw.study_instance_uuid.filter(|id| !id.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uids_numbers_placeholders() {
        let records = StudyRecord::from_uids(["1.2.3", "4.5.6"]);
        assert_eq!(records[0], StudyRecord::new("patient_1", "1.2.3"));
        assert_eq!(records[1].patient_name, "patient_2");
        assert!(records[1].study_instance_uuid.is_none());
    }

    #[test]
    fn test_lenient_deserialization() {
        let records: Vec<StudyRecord> = serde_json::from_str(
            r#"[
                {"patient_name": "DOE^JANE", "study_instance_uid": "1.2", "modality": "MR"},
                {"patient_name": null, "study_instance_uid": "3.4", "study_instance_uuid": "abc"},
                {"study_instance_uuid": ""}
            ]"#,
        )
        .unwrap();

        assert_eq!(records[0], StudyRecord::new("DOE^JANE", "1.2"));
        assert_eq!(records[1].patient_name, "patient");
        assert_eq!(records[1].study_instance_uuid.as_deref(), Some("abc"));
        assert_eq!(records[2].study_instance_uid, "");
        assert!(records[2].study_instance_uuid.is_none());
    }
}
