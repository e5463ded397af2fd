use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, format_timestamp, parse_timestamp, to_i64},
    models::{CaptureKind, CaptureRecord, WindowText},
};

/// Half-open `[from, to)` read of one capture table, oldest first. Rows that
/// share a second keep insertion order.
pub(crate) fn select_since_in(
    conn: &Connection,
    kind: CaptureKind,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT text_content FROM {}
         WHERE timestamp >= ?1 AND timestamp < ?2
         ORDER BY timestamp ASC, id ASC",
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![format_timestamp(from), format_timestamp(to)],
        |row| row.get::<_, String>(0),
    )?;

    let mut texts = Vec::new();
    for row in rows {
        texts.push(row?);
    }
    Ok(texts)
}

/// Timestamp of the row just past the first `cap` rows of one table's
/// `[from, to)` window, if the window holds more than `cap` rows.
fn overflow_timestamp_in(
    conn: &Connection,
    kind: CaptureKind,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
    cap: usize,
) -> Result<Option<NaiveDateTime>> {
    let sql = format!(
        "SELECT timestamp FROM {}
         WHERE timestamp >= ?1 AND timestamp < ?2
         ORDER BY timestamp ASC, id ASC
         LIMIT 1 OFFSET ?3",
        kind.table()
    );
    let overflow: Option<String> = conn
        .query_row(
            &sql,
            params![format_timestamp(from), format_timestamp(to), to_i64(cap)?],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to look past the {kind} row cap"))?;

    overflow
        .map(|value| parse_timestamp(&value, "timestamp"))
        .transpose()
}

fn window_in(conn: &Connection, from: &NaiveDateTime, to: &NaiveDateTime) -> Result<WindowText> {
    let mut window = WindowText::default();
    for kind in CaptureKind::ALL {
        *window.rows_mut(kind) = select_since_in(conn, kind, from, to)
            .with_context(|| format!("failed to read {} window", kind))?;
    }
    Ok(window)
}

/// Earliest capture timestamp across all three tables.
pub(crate) fn earliest_capture_in(conn: &Connection) -> Result<Option<NaiveDateTime>> {
    let earliest: Option<String> = conn
        .query_row(
            "SELECT MIN(ts) FROM (
                SELECT MIN(timestamp) AS ts FROM screenshots
                UNION ALL SELECT MIN(timestamp) AS ts FROM photos
                UNION ALL SELECT MIN(timestamp) AS ts FROM audio
            )",
            [],
            |row| row.get(0),
        )
        .context("failed to read earliest capture timestamp")?;

    earliest
        .map(|value| parse_timestamp(&value, "timestamp"))
        .transpose()
}

impl Database {
    pub async fn append_capture(&self, record: &CaptureRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let sql = format!(
                "INSERT INTO {} (timestamp, media_reference, text_content) VALUES (?1, ?2, ?3)",
                record.kind.table()
            );
            conn.execute(
                &sql,
                params![
                    format_timestamp(&record.timestamp),
                    record.media_reference,
                    record.text_content,
                ],
            )
            .with_context(|| format!("failed to insert {} record", record.kind))?;
            Ok(())
        })
        .await
    }

    pub async fn select_since(
        &self,
        kind: CaptureKind,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<String>> {
        self.execute(move |conn| select_since_in(conn, kind, &from, &to))
            .await
    }

    /// All three windows read in one store task, so no insert lands between them.
    pub async fn select_window(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<WindowText> {
        self.execute(move |conn| window_in(conn, &from, &to)).await
    }

    /// `[from, to)` shortened so that no source contributes more than `cap`
    /// rows; returns the rows and the exclusive end actually used. Rows past
    /// the end stay above it and fall into the next window. `cap == 0`
    /// leaves the window whole.
    ///
    /// The end never drops below `from + 1s`, so more than `cap` rows sharing
    /// the window's first second are still consumed together.
    pub async fn select_window_capped(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        cap: usize,
    ) -> Result<(WindowText, NaiveDateTime)> {
        self.execute(move |conn| {
            let mut end = to;
            if cap > 0 {
                for kind in CaptureKind::ALL {
                    if let Some(overflow) = overflow_timestamp_in(conn, kind, &from, &to, cap)? {
                        end = end.min(overflow);
                    }
                }
                if end <= from {
                    end = (from + ChronoDuration::seconds(1)).min(to);
                }
            }
            Ok((window_in(conn, &from, &end)?, end))
        })
        .await
    }

    pub async fn get_captures(&self, kind: CaptureKind) -> Result<Vec<CaptureRecord>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT timestamp, media_reference, text_content FROM {}
                 ORDER BY timestamp ASC, id ASC",
                kind.table()
            );
            let mut stmt = conn.prepare(&sql)?;
            let records_iter = stmt.query_map([], |row| {
                let timestamp_str: String = row.get(0)?;
                let timestamp =
                    parse_timestamp(&timestamp_str, "timestamp").map_err(conversion_error)?;
                Ok(CaptureRecord {
                    kind,
                    timestamp,
                    media_reference: row.get(1)?,
                    text_content: row.get(2)?,
                })
            })?;

            let mut records = Vec::new();
            for record in records_iter {
                records.push(record?);
            }
            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{at, open_test_db, record};

    #[tokio::test]
    async fn window_is_half_open_and_ordered() {
        let (_dir, db) = open_test_db();
        for (ts, text) in [(at(10, 5, 0), "B"), (at(10, 0, 0), "A"), (at(10, 6, 0), "C")] {
            db.append_capture(&record(CaptureKind::Screenshot, ts, text))
                .await
                .unwrap();
        }

        let texts = db
            .select_since(CaptureKind::Screenshot, at(10, 0, 0), at(10, 6, 0))
            .await
            .unwrap();
        assert_eq!(texts, vec!["A".to_string(), "B".to_string()]);

        let rest = db
            .select_since(CaptureKind::Screenshot, at(10, 6, 0), at(11, 0, 0))
            .await
            .unwrap();
        assert_eq!(rest, vec!["C".to_string()]);
    }

    #[tokio::test]
    async fn tables_are_independent() {
        let (_dir, db) = open_test_db();
        db.append_capture(&record(CaptureKind::Photo, at(9, 0, 0), "desk"))
            .await
            .unwrap();
        db.append_capture(&record(CaptureKind::Audio, at(9, 1, 0), "music"))
            .await
            .unwrap();

        let window = db.select_window(at(8, 0, 0), at(10, 0, 0)).await.unwrap();
        assert!(window.screenshots.is_empty());
        assert_eq!(window.photos, vec!["desk".to_string()]);
        assert_eq!(window.audio, vec!["music".to_string()]);
        assert_eq!(window.row_count(), 2);
    }

    #[tokio::test]
    async fn capped_window_ends_at_the_first_overflowing_row() {
        let (_dir, db) = open_test_db();
        for (minute, text) in [(0, "s0"), (1, "s1"), (2, "s2"), (3, "s3")] {
            db.append_capture(&record(CaptureKind::Screenshot, at(10, minute, 0), text))
                .await
                .unwrap();
        }
        db.append_capture(&record(CaptureKind::Audio, at(10, 0, 30), "early talk"))
            .await
            .unwrap();
        db.append_capture(&record(CaptureKind::Audio, at(10, 2, 30), "late talk"))
            .await
            .unwrap();

        let (window, end) = db
            .select_window_capped(at(10, 0, 0), at(11, 0, 0), 2)
            .await
            .unwrap();
        assert_eq!(end, at(10, 2, 0));
        assert_eq!(window.screenshots, vec!["s0".to_string(), "s1".to_string()]);
        assert_eq!(window.audio, vec!["early talk".to_string()]);

        let (rest, rest_end) = db.select_window_capped(end, at(11, 0, 0), 2).await.unwrap();
        assert_eq!(rest_end, at(11, 0, 0));
        assert_eq!(rest.screenshots, vec!["s2".to_string(), "s3".to_string()]);
        assert_eq!(rest.audio, vec!["late talk".to_string()]);
    }

    #[tokio::test]
    async fn capped_window_still_advances_past_a_crowded_second() {
        let (_dir, db) = open_test_db();
        for text in ["a", "b", "c"] {
            db.append_capture(&record(CaptureKind::Photo, at(10, 0, 0), text))
                .await
                .unwrap();
        }

        let (window, end) = db
            .select_window_capped(at(10, 0, 0), at(10, 5, 0), 1)
            .await
            .unwrap();
        assert_eq!(end, at(10, 0, 1));
        assert_eq!(window.photos.len(), 3);
    }

    #[tokio::test]
    async fn zero_cap_keeps_the_whole_window() {
        let (_dir, db) = open_test_db();
        for minute in 0..5 {
            db.append_capture(&record(CaptureKind::Screenshot, at(10, minute, 0), "x"))
                .await
                .unwrap();
        }
        let (window, end) = db
            .select_window_capped(at(10, 0, 0), at(10, 30, 0), 0)
            .await
            .unwrap();
        assert_eq!(end, at(10, 30, 0));
        assert_eq!(window.screenshots.len(), 5);
    }

    #[tokio::test]
    async fn stored_records_keep_all_fields() {
        let (_dir, db) = open_test_db();
        let mut original = record(CaptureKind::Audio, at(12, 30, 15), "");
        original.media_reference = "media/audio/clip.wav".into();
        db.append_capture(&original).await.unwrap();

        let stored = db.get_captures(CaptureKind::Audio).await.unwrap();
        assert_eq!(stored, vec![original]);
    }

    #[tokio::test]
    async fn append_after_shutdown_fails() {
        let (_dir, db) = open_test_db();
        db.shutdown();
        let result = db
            .append_capture(&record(CaptureKind::Screenshot, at(10, 0, 0), "A"))
            .await;
        assert!(result.is_err());
    }
}
