use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{beginning_of_time, conversion_error, format_timestamp, parse_timestamp, to_i64},
    models::{SummaryCommit, SummaryRecord},
};

use super::captures::earliest_capture_in;

fn row_to_summary(row: &Row) -> Result<SummaryRecord, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    let covers_from: String = row.get("covers_from")?;
    let covers_until: String = row.get("covers_until")?;

    Ok(SummaryRecord {
        created_at: parse_timestamp(&created_at, "created_at").map_err(conversion_error)?,
        covers_from: parse_timestamp(&covers_from, "covers_from").map_err(conversion_error)?,
        covers_until: parse_timestamp(&covers_until, "covers_until").map_err(conversion_error)?,
        content: row.get("content")?,
    })
}

fn latest_summary_in(conn: &Connection) -> Result<Option<SummaryRecord>> {
    conn.query_row(
        "SELECT created_at, covers_from, covers_until, content
         FROM summaries
         ORDER BY id DESC
         LIMIT 1",
        [],
        row_to_summary,
    )
    .optional()
    .context("failed to read latest summary")
}

/// The watermark derivation rule: `covers_until` of the most recently
/// created summary, else the earliest capture timestamp, else the
/// beginning-of-time sentinel.
pub(crate) fn watermark_in(conn: &Connection) -> Result<NaiveDateTime> {
    if let Some(summary) = latest_summary_in(conn)? {
        return Ok(summary.covers_until);
    }
    Ok(earliest_capture_in(conn)?.unwrap_or_else(beginning_of_time))
}

impl Database {
    pub async fn latest_watermark(&self) -> Result<NaiveDateTime> {
        self.execute(|conn| watermark_in(conn)).await
    }

    pub async fn latest_summary(&self) -> Result<Option<SummaryRecord>> {
        self.execute(|conn| latest_summary_in(conn)).await
    }

    /// Newest first.
    pub async fn list_summaries(&self, limit: usize) -> Result<Vec<SummaryRecord>> {
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT created_at, covers_from, covers_until, content
                 FROM summaries
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;
            let summaries_iter = stmt.query_map(params![limit], row_to_summary)?;

            let mut summaries = Vec::new();
            for summary in summaries_iter {
                summaries.push(summary?);
            }
            Ok(summaries)
        })
        .await
    }

    /// Appends `summary` only if the watermark is still `expected_watermark`.
    ///
    /// The re-read and the insert share one transaction on the store thread,
    /// so two rollups computed from the same watermark cannot both commit.
    pub async fn append_summary(
        &self,
        expected_watermark: NaiveDateTime,
        summary: &SummaryRecord,
    ) -> Result<SummaryCommit> {
        let record = summary.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let current = watermark_in(&tx)?;
            if current != expected_watermark || record.covers_until < current {
                return Ok(SummaryCommit::Superseded {
                    current_watermark: current,
                });
            }

            tx.execute(
                "INSERT INTO summaries (created_at, covers_from, covers_until, content)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    format_timestamp(&record.created_at),
                    format_timestamp(&record.covers_from),
                    format_timestamp(&record.covers_until),
                    record.content,
                ],
            )
            .context("failed to insert summary")?;

            tx.commit().context("failed to commit summary")?;
            Ok(SummaryCommit::Committed)
        })
        .await
    }
}
