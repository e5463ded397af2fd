use std::{path::Path, sync::Arc};

use crate::{
    db::CaptureKind,
    providers::{CommandCapture, CommandEnricher, Enricher, MediaCapture},
    settings::SettingsStore,
};

/// Strategy pair for one capture loop instance.
#[derive(Clone)]
pub struct CaptureSource {
    pub kind: CaptureKind,
    pub capture: Arc<dyn MediaCapture>,
    pub enricher: Arc<dyn Enricher>,
}

impl CaptureSource {
    pub fn new(
        kind: CaptureKind,
        capture: Arc<dyn MediaCapture>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        Self {
            kind,
            capture,
            enricher,
        }
    }

    /// Source backed by the configured shell commands.
    pub fn from_commands(kind: CaptureKind, settings: Arc<SettingsStore>, media_dir: &Path) -> Self {
        Self::new(
            kind,
            Arc::new(CommandCapture::new(kind, Arc::clone(&settings), media_dir.to_path_buf())),
            Arc::new(CommandEnricher::new(kind, settings)),
        )
    }
}
