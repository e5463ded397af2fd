use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{db::CaptureKind, error::LifelogError};

const SCREENSHOT_PROMPT: &str = "You are given the OCR text of a desktop screenshot. Describe what is on \
the screen and the text you can read, in detail. It may be a video, a terminal, social media, an editor \
or anything else. If unsure, make your best guess.";
const PHOTO_PROMPT: &str = "Describe the webcam image in detail.";
const AUDIO_PROMPT: &str = "You are given a transcript of the desktop microphone. It may be a video, a \
call, or a conversation next to the user. Describe the transcript in detail. If nothing intelligible \
was said, answer '-'.";
const SUMMARY_PROMPT: &str = "You are the user's helper inside their desktop. You are given some or all \
of: a running summary of the user's activity, descriptions of desktop screenshots, descriptions of \
webcam images, and transcripts of desktop audio. Update the running summary with precise, vivid details.";

/// Settings for one capture source. Read by its loop at the start of every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub enabled: bool,
    /// Pause between the end of one tick and the start of the next.
    pub interval_secs: u64,
    /// Length of each recording for sources that record over time (audio).
    pub record_secs: u64,
    pub model: String,
    pub prompt: String,
    pub capture_command: String,
    pub enrich_command: String,
    pub media_extension: String,
}

impl CaptureSettings {
    pub fn defaults_for(kind: CaptureKind) -> Self {
        match kind {
            CaptureKind::Screenshot => Self {
                enabled: true,
                interval_secs: 5 * 60,
                record_secs: 0,
                model: "openchat/openchat-3.5-1210".into(),
                prompt: SCREENSHOT_PROMPT.into(),
                capture_command: String::new(),
                enrich_command: String::new(),
                media_extension: "jpeg".into(),
            },
            CaptureKind::Photo => Self {
                enabled: true,
                interval_secs: 5 * 60,
                record_secs: 0,
                model: "gpt-4-turbo-preview".into(),
                prompt: PHOTO_PROMPT.into(),
                capture_command: String::new(),
                enrich_command: String::new(),
                media_extension: "jpeg".into(),
            },
            CaptureKind::Audio => Self {
                enabled: true,
                interval_secs: 1,
                record_secs: 60,
                model: "whisper".into(),
                prompt: AUDIO_PROMPT.into(),
                capture_command: String::new(),
                enrich_command: String::new(),
                media_extension: "wav".into(),
            },
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn record_duration(&self) -> Duration {
        Duration::from_secs(self.record_secs)
    }

    /// Intervals under one second would let two records of the same source
    /// share a timestamp.
    pub fn validate(&self, kind: CaptureKind) -> Result<(), LifelogError> {
        if self.interval_secs == 0 {
            return Err(LifelogError::ConfigInvalid(format!(
                "{kind}.interval_secs must be at least 1"
            )));
        }
        if self.media_extension.contains(['/', '\\']) {
            return Err(LifelogError::ConfigInvalid(format!(
                "{kind}.media_extension must not contain path separators"
            )));
        }
        Ok(())
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::defaults_for(CaptureKind::Screenshot)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub model: String,
    pub prompt: String,
    /// Rows taken from each source per rollup; 0 disables the cap.
    pub max_rows_per_source: usize,
    pub summarize_command: String,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15 * 60,
            model: "gpt-3.5-turbo".into(),
            prompt: SUMMARY_PROMPT.into(),
            max_rows_per_source: 100,
            summarize_command: String::new(),
        }
    }
}

impl SummarySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), LifelogError> {
        if self.interval_secs == 0 {
            return Err(LifelogError::ConfigInvalid(
                "summary.interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSettings {
    pub enabled: bool,
    /// Local hour of day (0-23) during which the digest goes out.
    pub hour: u32,
    pub recipient: String,
    pub subject: String,
    pub send_command: String,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: 21,
            recipient: String::new(),
            subject: "lifelog summary".into(),
            send_command: String::new(),
        }
    }
}

impl DigestSettings {
    pub fn validate(&self) -> Result<(), LifelogError> {
        if self.hour > 23 {
            return Err(LifelogError::ConfigInvalid(format!(
                "digest.hour must be between 0 and 23, got {}",
                self.hour
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub screenshot: CaptureSettings,
    pub photo: CaptureSettings,
    pub audio: CaptureSettings,
    pub summary: SummarySettings,
    pub digest: DigestSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            screenshot: CaptureSettings::defaults_for(CaptureKind::Screenshot),
            photo: CaptureSettings::defaults_for(CaptureKind::Photo),
            audio: CaptureSettings::defaults_for(CaptureKind::Audio),
            summary: SummarySettings::default(),
            digest: DigestSettings::default(),
        }
    }
}

impl UserSettings {
    pub fn capture(&self, kind: CaptureKind) -> &CaptureSettings {
        match kind {
            CaptureKind::Screenshot => &self.screenshot,
            CaptureKind::Photo => &self.photo,
            CaptureKind::Audio => &self.audio,
        }
    }

    pub fn capture_mut(&mut self, kind: CaptureKind) -> &mut CaptureSettings {
        match kind {
            CaptureKind::Screenshot => &mut self.screenshot,
            CaptureKind::Photo => &mut self.photo,
            CaptureKind::Audio => &mut self.audio,
        }
    }
}

// `serde(default)` fills the missing fields of a partial source section from
// `CaptureSettings::default()`, i.e. the screenshot defaults. Start from the
// per-source defaults and overlay whatever the file provides instead.
fn parse_settings(contents: &str) -> Result<UserSettings> {
    let defaults = serde_json::to_value(UserSettings::default())?;
    let provided: serde_json::Value = serde_json::from_str(contents)?;
    let merged = overlay(defaults, provided);
    Ok(serde_json::from_value(merged)?)
}

fn overlay(base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (key, value) in patch {
                let merged = match base.remove(&key) {
                    Some(existing) => overlay(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

/// JSON-backed settings. Every task takes a fresh snapshot per tick, so a
/// `reload()` or `update()` applies on the next tick without a restart.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse_settings(&contents).unwrap_or_else(|err| {
                warn!(
                    "Settings at {} are malformed ({err:#}); using defaults",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> UserSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn capture(&self, kind: CaptureKind) -> CaptureSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .capture(kind)
            .clone()
    }

    pub fn summary(&self) -> SummarySettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .summary
            .clone()
    }

    pub fn digest(&self) -> DigestSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .digest
            .clone()
    }

    /// Applies `change` and writes the result back to disk.
    pub fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut UserSettings),
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut *guard);
        self.persist(&*guard)
    }

    /// Re-reads the file. A malformed file is an error and leaves the current
    /// settings untouched.
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data = parse_settings(&contents)
            .with_context(|| format!("Malformed settings in {}", self.path.display()))?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
