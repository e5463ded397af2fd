use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::{
    clock::Clock,
    db::{Database, SummaryCommit, SummaryRecord},
    error::LifelogError,
    providers::Summarizer,
    settings::SettingsStore,
};

use super::merge::merged_text;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RollupOutcome {
    /// No capture rows since the watermark; nothing written.
    Empty { watermark: NaiveDateTime },
    Committed(SummaryRecord),
    /// A concurrent rollup moved the watermark first; nothing written.
    Superseded { current_watermark: NaiveDateTime },
}

/// Folds every capture since the watermark into one new summary record.
pub struct SummaryEngine {
    db: Database,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    summarizer: Arc<dyn Summarizer>,
}

impl SummaryEngine {
    pub fn new(
        db: Database,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            db,
            settings,
            clock,
            summarizer,
        }
    }

    /// One rollup over `[watermark, end)`.
    ///
    /// `end` is now, held back to the oldest capture tick still in flight
    /// and shortened further when a source has more than
    /// `max_rows_per_source` rows; whatever lies past it is left for the
    /// next call. A provider failure writes nothing, so the next call
    /// retries the same window (grown by whatever arrived since).
    pub async fn run_once(&self) -> Result<RollupOutcome, LifelogError> {
        let settings = self.settings.summary();

        let from_ts = self
            .db
            .latest_watermark()
            .await
            .map_err(LifelogError::store)?;
        let window_end = self.db.rollup_window_end(self.clock.as_ref());

        if window_end <= from_ts {
            return Ok(RollupOutcome::Empty { watermark: from_ts });
        }

        let (window, to_ts) = self
            .db
            .select_window_capped(from_ts, window_end, settings.max_rows_per_source)
            .await
            .map_err(LifelogError::store)?;
        if window.is_empty() {
            return Ok(RollupOutcome::Empty { watermark: from_ts });
        }
        if to_ts < window_end {
            log_warn!(
                "rollup capped at {} rows per source; window ends at {} instead of {}",
                settings.max_rows_per_source,
                to_ts,
                window_end
            );
        }

        let previous = self
            .db
            .latest_summary()
            .await
            .map_err(LifelogError::store)?
            .map(|summary| summary.content)
            .unwrap_or_default();

        let summarizer = Arc::clone(&self.summarizer);
        let prompt = settings.prompt;
        let merged_input = merged_text(&window);
        let content = tokio::task::spawn_blocking(move || {
            summarizer.summarize(&merged_input, &previous, &prompt)
        })
        .await
        .map_err(|err| LifelogError::provider("summarizer", err.into()))?
        .map_err(|err| LifelogError::provider("summarizer", err))?;

        let record = SummaryRecord {
            created_at: self.clock.now(),
            covers_from: from_ts,
            covers_until: to_ts,
            content,
        };

        let commit = self
            .db
            .append_summary(from_ts, &record)
            .await
            .map_err(LifelogError::store)?;

        match commit {
            SummaryCommit::Committed => {
                log_info!(
                    "summary committed for [{}, {}) from {} rows",
                    from_ts,
                    to_ts,
                    window.row_count()
                );
                Ok(RollupOutcome::Committed(record))
            }
            SummaryCommit::Superseded { current_watermark } => {
                log_warn!(
                    "rollup from {} discarded; watermark already at {}",
                    from_ts,
                    current_watermark
                );
                Ok(RollupOutcome::Superseded { current_watermark })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::{CaptureLoop, CaptureSource, TickOutcome},
        clock::ManualClock,
        db::{
            helpers::beginning_of_time,
            test_support::{at, open_test_db, record},
            CaptureKind,
        },
        providers::fakes::{FixedEnricher, GatedCapture, RecordingSummarizer, ScriptedCapture},
    };
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Database,
        settings: Arc<SettingsStore>,
        clock: Arc<ManualClock>,
        summarizer: Arc<RecordingSummarizer>,
        engine: SummaryEngine,
    }

    fn fixture(now: NaiveDateTime) -> Fixture {
        let (dir, db) = open_test_db();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let clock = Arc::new(ManualClock::new(now));
        let summarizer = Arc::new(RecordingSummarizer::ok("summary one"));
        let engine = SummaryEngine::new(
            db.clone(),
            Arc::clone(&settings),
            clock.clone(),
            summarizer.clone(),
        );
        Fixture {
            _dir: dir,
            db,
            settings,
            clock,
            summarizer,
            engine,
        }
    }

    async fn capture(fx: &Fixture, kind: CaptureKind, ts: NaiveDateTime, text: &str) {
        fx.db.append_capture(&record(kind, ts, text)).await.unwrap();
    }

    #[tokio::test]
    async fn first_rollup_covers_from_earliest_capture() {
        let fx = fixture(at(10, 6, 0));
        capture(&fx, CaptureKind::Screenshot, at(10, 0, 0), "A").await;
        capture(&fx, CaptureKind::Screenshot, at(10, 5, 0), "B").await;

        let summary = match fx.engine.run_once().await.unwrap() {
            RollupOutcome::Committed(summary) => summary,
            other => panic!("expected a committed summary, got {other:?}"),
        };
        assert_eq!(summary.covers_from, at(10, 0, 0));
        assert_eq!(summary.covers_until, at(10, 6, 0));
        assert_eq!(summary.content, "summary one");

        assert_eq!(
            fx.summarizer.calls(),
            vec![("A\nB".to_string(), String::new())]
        );
        assert_eq!(fx.db.latest_watermark().await.unwrap(), at(10, 6, 0));
    }

    #[tokio::test]
    async fn all_sources_feed_the_merge() {
        let fx = fixture(at(11, 0, 0));
        capture(&fx, CaptureKind::Audio, at(10, 1, 0), "meeting notes").await;
        capture(&fx, CaptureKind::Photo, at(10, 2, 0), "at desk").await;
        capture(&fx, CaptureKind::Screenshot, at(10, 3, 0), "terminal").await;

        fx.engine.run_once().await.unwrap();
        assert_eq!(
            fx.summarizer.calls()[0].0,
            "terminal\nat desk\nmeeting notes"
        );
    }

    #[tokio::test]
    async fn empty_store_is_a_no_op() {
        let fx = fixture(at(10, 0, 0));
        let outcome = fx.engine.run_once().await.unwrap();
        assert_eq!(
            outcome,
            RollupOutcome::Empty {
                watermark: beginning_of_time()
            }
        );
        assert!(fx.summarizer.calls().is_empty());
        assert!(fx.db.latest_summary().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rerun_without_new_captures_writes_nothing() {
        let fx = fixture(at(10, 6, 0));
        capture(&fx, CaptureKind::Screenshot, at(10, 0, 0), "A").await;
        fx.engine.run_once().await.unwrap();

        fx.clock.set(at(10, 20, 0));
        let outcome = fx.engine.run_once().await.unwrap();
        assert_eq!(
            outcome,
            RollupOutcome::Empty {
                watermark: at(10, 6, 0)
            }
        );
        assert_eq!(fx.db.list_summaries(10).await.unwrap().len(), 1);
        assert_eq!(fx.db.latest_watermark().await.unwrap(), at(10, 6, 0));
    }

    #[tokio::test]
    async fn later_rollups_chain_on_the_previous_summary() {
        let fx = fixture(at(10, 6, 0));
        capture(&fx, CaptureKind::Screenshot, at(10, 0, 0), "A").await;
        fx.engine.run_once().await.unwrap();

        capture(&fx, CaptureKind::Screenshot, at(10, 6, 0), "C").await;
        fx.clock.set(at(10, 21, 0));
        fx.summarizer.set_reply(Ok("summary two"));

        let RollupOutcome::Committed(second) = fx.engine.run_once().await.unwrap() else {
            panic!("expected a second summary");
        };
        assert_eq!(second.covers_from, at(10, 6, 0));
        assert_eq!(second.covers_until, at(10, 21, 0));
        assert_eq!(
            fx.summarizer.calls()[1],
            ("C".to_string(), "summary one".to_string())
        );

        let history = fx.db.list_summaries(10).await.unwrap();
        assert!(history[0].covers_until >= history[1].covers_until);
    }

    #[tokio::test]
    async fn provider_failure_keeps_the_window_for_retry() {
        let fx = fixture(at(10, 6, 0));
        capture(&fx, CaptureKind::Screenshot, at(10, 0, 0), "A").await;
        fx.summarizer.set_reply(Err("rate limited"));

        let err = fx.engine.run_once().await.unwrap_err();
        assert!(matches!(
            err,
            LifelogError::ProviderFailure {
                provider: "summarizer",
                ..
            }
        ));
        assert!(fx.db.latest_summary().await.unwrap().is_none());
        assert_eq!(fx.db.latest_watermark().await.unwrap(), at(10, 0, 0));

        fx.summarizer.set_reply(Ok("recovered"));
        fx.clock.set(at(10, 21, 0));
        let RollupOutcome::Committed(summary) = fx.engine.run_once().await.unwrap() else {
            panic!("retry should commit");
        };
        assert_eq!(summary.covers_from, at(10, 0, 0));
        assert_eq!(summary.covers_until, at(10, 21, 0));
    }

    #[tokio::test]
    async fn clock_stepping_backwards_is_an_empty_window() {
        let fx = fixture(at(10, 6, 0));
        capture(&fx, CaptureKind::Screenshot, at(10, 0, 0), "A").await;
        fx.engine.run_once().await.unwrap();

        fx.clock.set(at(9, 0, 0));
        let outcome = fx.engine.run_once().await.unwrap();
        assert_eq!(
            outcome,
            RollupOutcome::Empty {
                watermark: at(10, 6, 0)
            }
        );
        assert_eq!(fx.summarizer.calls().len(), 1);
    }

    #[tokio::test]
    async fn rows_past_the_cap_roll_into_the_next_window() {
        let fx = fixture(at(10, 6, 0));
        fx.settings
            .update(|s| s.summary.max_rows_per_source = 2)
            .unwrap();
        capture(&fx, CaptureKind::Screenshot, at(10, 0, 0), "A").await;
        capture(&fx, CaptureKind::Screenshot, at(10, 1, 0), "B").await;
        capture(&fx, CaptureKind::Screenshot, at(10, 2, 0), "C").await;
        capture(&fx, CaptureKind::Audio, at(10, 1, 30), "talk").await;
        capture(&fx, CaptureKind::Audio, at(10, 3, 0), "more talk").await;

        let RollupOutcome::Committed(first) = fx.engine.run_once().await.unwrap() else {
            panic!("expected a committed summary");
        };
        assert_eq!(first.covers_until, at(10, 2, 0));
        assert_eq!(fx.summarizer.calls()[0].0, "A\nB\ntalk");

        let RollupOutcome::Committed(second) = fx.engine.run_once().await.unwrap() else {
            panic!("remaining rows should be summarized");
        };
        assert_eq!(second.covers_from, at(10, 2, 0));
        assert_eq!(second.covers_until, at(10, 6, 0));
        assert_eq!(fx.summarizer.calls()[1].0, "C\nmore talk");
    }

    #[tokio::test]
    async fn default_cap_eventually_summarizes_every_row() {
        let fx = fixture(at(13, 0, 0));
        for i in 0..150u32 {
            let ts = at(10, 0, 0) + chrono::Duration::seconds(i64::from(i) * 10);
            capture(&fx, CaptureKind::Screenshot, ts, &format!("row{i}")).await;
        }

        while let RollupOutcome::Committed(_) = fx.engine.run_once().await.unwrap() {}

        let summarized: Vec<String> = fx
            .summarizer
            .calls()
            .into_iter()
            .flat_map(|(merged, _)| merged.lines().map(str::to_string).collect::<Vec<_>>())
            .collect();
        let expected: Vec<String> = (0..150).map(|i| format!("row{i}")).collect();
        assert_eq!(summarized, expected);
        assert_eq!(fx.summarizer.calls().len(), 2);
    }

    #[tokio::test]
    async fn capture_in_flight_during_a_rollup_lands_in_the_next_one() {
        let fx = fixture(at(10, 0, 0));
        capture(&fx, CaptureKind::Screenshot, at(9, 59, 0), "EARLIER").await;

        let gate = Arc::new(GatedCapture::default());
        let source = CaptureSource::new(
            CaptureKind::Audio,
            gate.clone(),
            Arc::new(FixedEnricher::ok("IN_FLIGHT_CLIP")),
        );
        let mut worker = CaptureLoop::new(
            source,
            fx.db.clone(),
            Arc::clone(&fx.settings),
            fx.clock.clone(),
        );
        let audio_settings = fx.settings.capture(CaptureKind::Audio);
        let tick = tokio::spawn(async move { worker.tick(&audio_settings).await });

        gate.wait_until_entered().await;
        fx.clock.set(at(10, 0, 30));
        let RollupOutcome::Committed(first) = fx.engine.run_once().await.unwrap() else {
            panic!("the earlier row should be summarized");
        };
        assert_eq!(first.covers_until, at(10, 0, 0));
        assert_eq!(fx.summarizer.calls()[0].0, "EARLIER");

        gate.release();
        let outcome = tick.await.unwrap().unwrap();
        assert_eq!(outcome, TickOutcome::Persisted { enriched: true });

        fx.clock.set(at(10, 15, 0));
        let RollupOutcome::Committed(second) = fx.engine.run_once().await.unwrap() else {
            panic!("the in-flight clip should be summarized once persisted");
        };
        assert_eq!(second.covers_from, at(10, 0, 0));
        assert_eq!(second.covers_until, at(10, 15, 0));
        assert_eq!(fx.summarizer.calls()[1].0, "IN_FLIGHT_CLIP");
    }

    #[tokio::test]
    async fn failed_capture_releases_its_hold_on_the_window() {
        let fx = fixture(at(10, 0, 0));
        capture(&fx, CaptureKind::Screenshot, at(9, 59, 0), "EARLIER").await;

        let source = CaptureSource::new(
            CaptureKind::Photo,
            Arc::new(ScriptedCapture::scripted(vec![Err("camera busy".into())], b"jpeg")),
            Arc::new(FixedEnricher::ok("unused")),
        );
        let mut worker = CaptureLoop::new(
            source,
            fx.db.clone(),
            Arc::clone(&fx.settings),
            fx.clock.clone(),
        );
        let photo_settings = fx.settings.capture(CaptureKind::Photo);
        assert!(worker.tick(&photo_settings).await.is_err());

        fx.clock.set(at(10, 5, 0));
        let RollupOutcome::Committed(summary) = fx.engine.run_once().await.unwrap() else {
            panic!("expected a committed summary");
        };
        assert_eq!(summary.covers_until, at(10, 5, 0));
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_store_unavailable() {
        let fx = fixture(at(10, 6, 0));
        fx.db.shutdown();
        let err = fx.engine.run_once().await.unwrap_err();
        assert!(matches!(err, LifelogError::StoreUnavailable(_)));
    }
}
