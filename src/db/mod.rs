mod connection;
pub mod helpers;
mod in_flight;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use in_flight::PendingCapture;
pub use models::{CaptureKind, CaptureRecord, SummaryCommit, SummaryRecord, WindowText};
