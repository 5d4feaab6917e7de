use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Document format version stamped into every uploaded snapshot.
pub const SNAPSHOT_VERSION: &str = "4.8";

/// Top-level members a remote document must carry to be applied at all.
/// Staff and activity logs are optional for compatibility with documents
/// written before those collections existed.
const REQUIRED_MEMBERS: [&str; 4] = [
    "students",
    "assessmentMetadata",
    "attendanceData",
    "batchMetadata",
];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("remote document is not a JSON object")]
    NotAnObject,
    #[error("remote document is missing required member: {0}")]
    MissingMember(&'static str),
    #[error("remote document failed to deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Full application state, the unit of synchronization. Uploaded and
/// downloaded wholesale; there is no partial or incremental sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub last_updated: String,
    pub version: String,
    pub students: Vec<Student>,
    pub assessment_metadata: BTreeMap<String, AssessmentMeta>,
    pub attendance_data: BTreeMap<String, BTreeMap<String, AttendanceDay>>,
    pub batch_metadata: BTreeMap<String, BatchMeta>,
    #[serde(default)]
    pub staff_members: Vec<StaffMember>,
    #[serde(default)]
    pub activity_logs: Vec<ActivityLogEntry>,
}

impl Snapshot {
    /// Convert a raw remote document into a typed snapshot. The required
    /// top-level members are checked first so a truncated or foreign
    /// document fails with the missing member named, before any field
    /// level deserialization runs.
    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        let Some(object) = value.as_object() else {
            return Err(SnapshotError::NotAnObject);
        };
        for member in REQUIRED_MEMBERS {
            if !object.contains_key(member) {
                return Err(SnapshotError::MissingMember(member));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Stamp the upload timestamp and current format version. Called by
    /// the orchestrator right before the snapshot goes out.
    pub fn stamp(&mut self, timestamp: impl Into<String>) {
        self.last_updated = timestamp.into();
        self.version = SNAPSHOT_VERSION.to_string();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub admission_no: String,
    pub batch_id: String,
    #[serde(default)]
    pub sub_batch: Option<String>,
    #[serde(default)]
    pub marks: BTreeMap<String, MarkSheet>,
}

/// Marks a student scored on one assessment sheet, keyed by question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkSheet {
    #[serde(default)]
    pub marks: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub color_code: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Metadata for one assessment sheet, keyed by the composite sheet key
/// (batch, semester, kind, max mark). Values stay strings because the
/// producing forms emit strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentMeta {
    pub date: String,
    pub semester: String,
    pub max_mark: String,
}

/// One day's attendance for a batch: per-student marks plus an optional
/// session label, flattened so the wire form stays `{studentId: "present",
/// ..., "sessionType": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceDay {
    #[serde(
        rename = "sessionType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_type: Option<String>,
    #[serde(flatten)]
    pub marks: BTreeMap<String, AttendanceMark>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMark {
    Present,
    Absent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMeta {
    #[serde(default)]
    pub in_charge: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub id: i64,
    pub timestamp: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub role: String,
    pub action: String,
    #[serde(default)]
    pub details: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}
