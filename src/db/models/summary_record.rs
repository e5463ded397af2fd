use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::CaptureKind;

/// One incremental rollup. `covers_until` is the exclusive upper bound of the
/// consumed window; the newest record's value is the watermark for the next
/// rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub created_at: NaiveDateTime,
    pub covers_from: NaiveDateTime,
    pub covers_until: NaiveDateTime,
    pub content: String,
}

/// Result of the compare-and-append in `Database::append_summary`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryCommit {
    Committed,
    /// Another rollup advanced the watermark first; nothing was written.
    Superseded { current_watermark: NaiveDateTime },
}

/// Text pulled from the three capture tables for one window, each in
/// timestamp order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowText {
    pub screenshots: Vec<String>,
    pub photos: Vec<String>,
    pub audio: Vec<String>,
}

impl WindowText {
    /// True when no capture rows fall into the window at all.
    pub fn is_empty(&self) -> bool {
        self.screenshots.is_empty() && self.photos.is_empty() && self.audio.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.screenshots.len() + self.photos.len() + self.audio.len()
    }

    pub fn rows(&self, kind: CaptureKind) -> &[String] {
        match kind {
            CaptureKind::Screenshot => &self.screenshots,
            CaptureKind::Photo => &self.photos,
            CaptureKind::Audio => &self.audio,
        }
    }

    pub(crate) fn rows_mut(&mut self, kind: CaptureKind) -> &mut Vec<String> {
        match kind {
            CaptureKind::Screenshot => &mut self.screenshots,
            CaptureKind::Photo => &mut self.photos,
            CaptureKind::Audio => &mut self.audio,
        }
    }
}
