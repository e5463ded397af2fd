pub mod capture_record;
pub mod summary_record;

pub use capture_record::{CaptureKind, CaptureRecord};
pub use summary_record::{SummaryCommit, SummaryRecord, WindowText};
