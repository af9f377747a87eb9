use std::thread;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{self, LeaseRecord};

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("series {0} is busy: another job holds its lease")]
    Busy(i64),
    #[error("lease database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// Exclusive claim on one recurring series, backed by a `series_lease` row
/// so it holds across connections and processes. Dropping the guard
/// releases the row; a crashed holder's row is taken over once it expires.
#[derive(Debug)]
pub struct SeriesLease<'c> {
    conn: &'c Connection,
    series_id: i64,
    holder: String,
}

impl<'c> SeriesLease<'c> {
    pub fn acquire(
        conn: &'c Connection,
        series_id: i64,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Self, LeaseError> {
        let holder = Uuid::now_v7().to_string();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let start = Instant::now();
        loop {
            let now_ms = now_unix_ms();
            let record = LeaseRecord {
                series_id,
                holder: holder.clone(),
                acquired_at_ms: now_ms,
                expires_at_ms: now_ms.saturating_add(ttl_ms),
            };
            if db::try_insert_lease(conn, &record)? {
                debug!(series_id, %holder, "series lease acquired");
                return Ok(Self {
                    conn,
                    series_id,
                    holder,
                });
            }
            if start.elapsed() >= wait {
                if let Some(current) = db::get_lease(conn, series_id)? {
                    debug!(
                        series_id,
                        holder = %current.holder,
                        acquired_at_ms = current.acquired_at_ms,
                        expires_in_ms = current.expires_at_ms.saturating_sub(now_unix_ms()),
                        "series lease busy"
                    );
                }
                return Err(LeaseError::Busy(series_id));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for SeriesLease<'_> {
    fn drop(&mut self) {
        if let Err(err) = db::delete_lease(self.conn, self.series_id, &self.holder) {
            warn!(series_id = self.series_id, error = %err, "failed to release series lease");
        }
    }
}

fn now_unix_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}
