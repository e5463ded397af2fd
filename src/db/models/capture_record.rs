//! Capture record data model.
//!
//! One row per successful capture tick of a source. `text_content` is the
//! provider-derived description or transcript and is empty when enrichment
//! failed.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureKind {
    Screenshot,
    Photo,
    Audio,
}

impl CaptureKind {
    /// Merge order used when rolling the sources into a summary.
    pub const ALL: [CaptureKind; 3] = [CaptureKind::Screenshot, CaptureKind::Photo, CaptureKind::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Screenshot => "screenshot",
            CaptureKind::Photo => "photo",
            CaptureKind::Audio => "audio",
        }
    }

    /// Backing table. Static names only, so they are safe to splice into SQL.
    pub fn table(&self) -> &'static str {
        match self {
            CaptureKind::Screenshot => "screenshots",
            CaptureKind::Photo => "photos",
            CaptureKind::Audio => "audio",
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub kind: CaptureKind,
    pub timestamp: NaiveDateTime,
    pub media_reference: String,
    pub text_content: String,
}
