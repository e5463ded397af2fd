use thiserror::Error;

use crate::db::CaptureKind;

/// Failure classes surfaced at component boundaries.
///
/// Store, settings and provider internals work with `anyhow::Result`; loop
/// ticks, rollups and digest checks convert into one of these so the
/// driving task can decide between skipping, degrading and retrying.
#[derive(Debug, Error)]
pub enum LifelogError {
    /// Capture produced nothing usable; the tick is skipped.
    #[error("{kind} capture failed: {message}")]
    CaptureFailure { kind: CaptureKind, message: String },

    /// Enrichment failed; the record is still persisted with empty text.
    #[error("{kind} enrichment failed: {message}")]
    EnrichmentFailure { kind: CaptureKind, message: String },

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{provider} provider failed: {message}")]
    ProviderFailure {
        provider: &'static str,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl LifelogError {
    pub(crate) fn store(err: anyhow::Error) -> Self {
        LifelogError::StoreUnavailable(format!("{err:#}"))
    }

    pub(crate) fn provider(provider: &'static str, err: anyhow::Error) -> Self {
        LifelogError::ProviderFailure {
            provider,
            message: format!("{err:#}"),
        }
    }
}
