pub mod engine;
pub mod loop_worker;
pub mod merge;

pub use engine::{RollupOutcome, SummaryEngine};
pub use loop_worker::summary_loop;
pub use merge::merged_text;
