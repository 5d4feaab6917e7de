mod client;
mod snapshot;

pub use client::{
    AccountInfo, ApiErrorClass, BranchOutcome, ContentsClient, ContentsError, PutContent,
    PutResult, RemoteFile,
};
pub use snapshot::{
    ActivityLogEntry, AssessmentMeta, AttendanceDay, AttendanceMark, BatchMeta, MarkSheet,
    SNAPSHOT_VERSION, Snapshot, SnapshotError, StaffMember, Student,
};
