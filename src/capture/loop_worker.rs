use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::time::{Duration, Instant};

use crate::{
    clock::Clock,
    control::RunSignal,
    db::{CaptureRecord, Database},
    error::LifelogError,
    providers::{CaptureRequest, CapturedMedia},
    settings::{CaptureSettings, SettingsStore},
};

use super::source::CaptureSource;

// Set to false to silence per-tick logging from the capture loops
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Capturing,
    Enriching,
    Persisting,
    Waiting,
    /// Terminal.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Persisted { enriched: bool },
    Disabled,
}

/// Periodic capture → enrich → persist producer for one source.
pub struct CaptureLoop {
    source: CaptureSource,
    db: Database,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    phase: CapturePhase,
}

impl CaptureLoop {
    pub fn new(
        source: CaptureSource,
        db: Database,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            db,
            settings,
            clock,
            phase: CapturePhase::Idle,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    /// Ticks until `signal` is cancelled and returns the terminal phase.
    ///
    /// Cancellation is only observed between ticks, so a capture that is in
    /// flight when `stop()` is called still gets persisted.
    pub async fn run(mut self, signal: RunSignal) -> CapturePhase {
        let kind = self.source.kind;
        let mut settings = self.settings.capture(kind);
        if let Err(err) = settings.validate(kind) {
            log_error!("{kind} loop not started: {err}");
            self.phase = CapturePhase::Stopped;
            return self.phase;
        }

        log_info!("{kind} loop started (interval {}s)", settings.interval_secs);

        while signal.is_running() {
            let latest = self.settings.capture(kind);
            match latest.validate(kind) {
                Ok(()) => settings = latest,
                Err(err) => log_warn!("{kind} loop keeping previous settings: {err}"),
            }

            let tick_start = Instant::now();
            match self.tick(&settings).await {
                Ok(TickOutcome::Persisted { enriched: true }) => {
                    log_info!("{kind} captured in {}ms", tick_start.elapsed().as_millis());
                }
                Ok(TickOutcome::Persisted { enriched: false }) => {
                    log_warn!(
                        "{kind} captured without text in {}ms",
                        tick_start.elapsed().as_millis()
                    );
                }
                Ok(TickOutcome::Disabled) => {}
                Err(err @ LifelogError::StoreUnavailable(_)) => {
                    log_error!("{kind} capture lost: {err}");
                }
                Err(err) => log_warn!("{kind} tick skipped: {err}"),
            }

            self.phase = CapturePhase::Waiting;
            if signal.wait_or_cancel(settings.interval()).await {
                break;
            }
        }

        self.phase = CapturePhase::Stopped;
        log_info!("{kind} loop shutting down");
        self.phase
    }

    /// One capture → enrich → persist pass.
    pub async fn tick(&mut self, settings: &CaptureSettings) -> Result<TickOutcome, LifelogError> {
        let kind = self.source.kind;
        if !settings.enabled {
            self.phase = CapturePhase::Idle;
            return Ok(TickOutcome::Disabled);
        }

        // Held until the row is written so no rollup window closes past it.
        let pending = self.db.stamp_capture(self.clock.as_ref());
        let timestamp = pending.timestamp();

        self.phase = CapturePhase::Capturing;
        let media = Arc::new(self.capture(timestamp, settings.record_duration()).await?);

        self.phase = CapturePhase::Enriching;
        let (text_content, enriched) = match self.enrich(&media, &settings.prompt).await {
            Ok(text) => (text, true),
            Err(err) => {
                log_warn!("{err}; keeping raw {kind} media");
                (String::new(), false)
            }
        };

        self.phase = CapturePhase::Persisting;
        let record = CaptureRecord {
            kind,
            timestamp,
            media_reference: media.reference.clone(),
            text_content,
        };
        self.db
            .append_capture(&record)
            .await
            .map_err(LifelogError::store)?;
        drop(pending);

        Ok(TickOutcome::Persisted { enriched })
    }

    async fn capture(
        &self,
        timestamp: NaiveDateTime,
        record_for: Duration,
    ) -> Result<CapturedMedia, LifelogError> {
        let kind = self.source.kind;
        let capture = Arc::clone(&self.source.capture);
        let request = CaptureRequest {
            timestamp,
            record_for,
        };

        let media = tokio::task::spawn_blocking(move || capture.capture(&request))
            .await
            .map_err(|err| LifelogError::CaptureFailure {
                kind,
                message: format!("capture worker join failed: {err}"),
            })?
            .map_err(|err| LifelogError::CaptureFailure {
                kind,
                message: format!("{err:#}"),
            })?;

        if media.is_empty() {
            return Err(LifelogError::CaptureFailure {
                kind,
                message: "capture returned no media".into(),
            });
        }

        Ok(media)
    }

    async fn enrich(&self, media: &Arc<CapturedMedia>, prompt: &str) -> Result<String, LifelogError> {
        let kind = self.source.kind;
        let enricher = Arc::clone(&self.source.enricher);
        let media = Arc::clone(media);
        let prompt = prompt.to_string();

        tokio::task::spawn_blocking(move || enricher.enrich(&media, &prompt))
            .await
            .map_err(|err| LifelogError::EnrichmentFailure {
                kind,
                message: format!("enrichment worker join failed: {err}"),
            })?
            .map_err(|err| LifelogError::EnrichmentFailure {
                kind,
                message: format!("{err:#}"),
            })
    }
}
