use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::params;

use crate::db::{
    connection::Database,
    helpers::{format_day, format_timestamp},
};

impl Database {
    pub async fn digest_sent_on(&self, day: NaiveDate) -> Result<bool> {
        self.execute(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM digest_log WHERE day = ?1",
                    params![format_day(&day)],
                    |row| row.get(0),
                )
                .context("failed to read digest log")?;
            Ok(count > 0)
        })
        .await
    }

    pub async fn record_digest_sent(
        &self,
        day: NaiveDate,
        sent_at: NaiveDateTime,
        covers_until: NaiveDateTime,
    ) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO digest_log (day, sent_at, covers_until)
                 VALUES (?1, ?2, ?3)",
                params![
                    format_day(&day),
                    format_timestamp(&sent_at),
                    format_timestamp(&covers_until),
                ],
            )
            .context("failed to record digest")?;
            Ok(())
        })
        .await
    }
}
