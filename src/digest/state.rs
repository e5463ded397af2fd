use chrono::{NaiveDate, NaiveDateTime, Timelike};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestStatus {
    #[default]
    NotSent,
    Sent,
}

/// In-memory view of today's digest flag.
///
/// The flag belongs to `last_checked_day`; when the calendar day changes the
/// caller loads the persisted flag for the new day and calls [`roll_over`].
///
/// [`roll_over`]: DigestState::roll_over
#[derive(Debug, Clone, Default)]
pub struct DigestState {
    last_checked_day: Option<NaiveDate>,
    status: DigestStatus,
}

impl DigestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> DigestStatus {
        self.status
    }

    pub fn last_checked_day(&self) -> Option<NaiveDate> {
        self.last_checked_day
    }

    pub fn needs_roll_over(&self, today: NaiveDate) -> bool {
        self.last_checked_day != Some(today)
    }

    pub fn roll_over(&mut self, today: NaiveDate, already_sent: bool) {
        self.last_checked_day = Some(today);
        self.status = if already_sent {
            DigestStatus::Sent
        } else {
            DigestStatus::NotSent
        };
    }

    /// Due when today's digest is still pending and `now` is in the send hour.
    pub fn is_due(&self, now: NaiveDateTime, hour: u32) -> bool {
        self.last_checked_day == Some(now.date())
            && self.status == DigestStatus::NotSent
            && now.hour() == hour
    }

    pub fn mark_sent(&mut self) {
        self.status = DigestStatus::Sent;
    }
}
