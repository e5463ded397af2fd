//! Seams to the perception, summarization and delivery collaborators.
//!
//! Every call is blocking; the loops run them on tokio's blocking pool.

pub mod command;
#[cfg(test)]
pub(crate) mod fakes;

use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDateTime;

pub use command::{CommandCapture, CommandDigestSender, CommandEnricher, CommandSummarizer};

/// What a capture tick asks of its source.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub timestamp: NaiveDateTime,
    /// Recording length for time-based sources; zero for snapshots.
    pub record_for: Duration,
}

/// Raw media plus the handle the capture side stored it under.
#[derive(Debug, Clone, Default)]
pub struct CapturedMedia {
    pub bytes: Vec<u8>,
    pub reference: String,
}

impl CapturedMedia {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub trait MediaCapture: Send + Sync {
    fn capture(&self, request: &CaptureRequest) -> Result<CapturedMedia>;
}

/// Turns media into text: a description for images, a transcript for audio.
pub trait Enricher: Send + Sync {
    fn enrich(&self, media: &CapturedMedia, prompt: &str) -> Result<String>;
}

pub trait Summarizer: Send + Sync {
    fn summarize(&self, merged_text: &str, previous_summary: &str, prompt: &str) -> Result<String>;
}

pub trait DigestSender: Send + Sync {
    fn send_digest(&self, content: &str) -> Result<()>;
}
