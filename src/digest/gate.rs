use std::sync::Arc;

use crate::{
    clock::Clock,
    db::Database,
    error::LifelogError,
    providers::DigestSender,
    settings::SettingsStore,
};

use super::state::{DigestState, DigestStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    Disabled,
    NotDue,
    AlreadySent,
    /// Due, but no summary exists yet.
    NothingToSend,
    Sent,
}

/// Sends the latest summary at most once per calendar day.
pub struct DigestGate {
    db: Database,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    sender: Arc<dyn DigestSender>,
    state: DigestState,
}

impl DigestGate {
    pub fn new(
        db: Database,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
        sender: Arc<dyn DigestSender>,
    ) -> Self {
        Self {
            db,
            settings,
            clock,
            sender,
            state: DigestState::new(),
        }
    }

    pub fn state(&self) -> &DigestState {
        &self.state
    }

    pub async fn check(&mut self) -> Result<DigestOutcome, LifelogError> {
        let settings = self.settings.digest();
        if !settings.enabled {
            return Ok(DigestOutcome::Disabled);
        }
        settings.validate()?;

        let now = self.clock.now();
        let today = now.date();
        if self.state.needs_roll_over(today) {
            let already_sent = self
                .db
                .digest_sent_on(today)
                .await
                .map_err(LifelogError::store)?;
            self.state.roll_over(today, already_sent);
        }

        if self.state.status() == DigestStatus::Sent {
            return Ok(DigestOutcome::AlreadySent);
        }
        if !self.state.is_due(now, settings.hour) {
            return Ok(DigestOutcome::NotDue);
        }

        let Some(summary) = self
            .db
            .latest_summary()
            .await
            .map_err(LifelogError::store)?
        else {
            log_info!("digest due but no summary exists yet");
            return Ok(DigestOutcome::NothingToSend);
        };

        let sender = Arc::clone(&self.sender);
        let content = summary.content;
        tokio::task::spawn_blocking(move || sender.send_digest(&content))
            .await
            .map_err(|err| LifelogError::provider("digest", err.into()))?
            .map_err(|err| LifelogError::provider("digest", err))?;

        // Sent is final for today even if the log write below fails.
        self.state.mark_sent();
        log_info!("digest sent for {today}");

        if let Err(err) = self
            .db
            .record_digest_sent(today, now, summary.covers_until)
            .await
        {
            log_warn!("digest for {today} sent but not recorded: {err:#}");
            return Err(LifelogError::store(err));
        }

        Ok(DigestOutcome::Sent)
    }
}
