pub mod loop_worker;
pub mod source;

pub use loop_worker::{CaptureLoop, CapturePhase, TickOutcome};
pub use source::CaptureSource;
