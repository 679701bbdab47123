//! Tracking store for one catalog file

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::schema::init_schema;
use super::StorageError;
use crate::crawler::FetchedFeed;
use crate::models::{DiscoveredItem, DueSource, NextCheck, Rank, SourceRecord, TrackingState};

type StorageResult<T> = Result<T, StorageError>;

const TRACKING_COLUMNS: &str = "rss_id, last_video_id, ts, ts_read, rank, counter, id_channel";

/// One row of the status listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub source: SourceRecord,
    pub tracking: TrackingState,
}

/// Handle on one catalog's SQLite file
///
/// The connection sits behind a mutex so a catalog can be shared between a
/// scheduler loop and the blocking worker it offloads to. Each write is a
/// single statement or a single transaction.
pub struct Catalog {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Catalog {
    /// Open an existing catalog
    ///
    /// Never creates the file; catalogs are created through [`Catalog::create`].
    pub fn open(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::configure(conn, path, busy_timeout)
    }

    /// Create a catalog (or upgrade an existing one) with the full schema
    pub fn create(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::configure(conn, path, busy_timeout)?;
        init_schema(&*catalog.conn()?)?;
        tracing::info!(catalog = %path.display(), "Catalog schema initialized");
        Ok(catalog)
    }

    fn configure(conn: Connection, path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let open_err = |source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        };
        conn.busy_timeout(busy_timeout).map_err(open_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(open_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(open_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(open_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Path of the catalog file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Register a source and seed its tracking row without a schedule
    ///
    /// Re-registering an existing url only refreshes the display name; an
    /// existing tracking row is left untouched. Returns the source id.
    pub fn register_source(&self, feed_id: &str, name: &str, url: &str) -> StorageResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let source_id = upsert_source(&tx, name, url)?;
        tx.execute(
            "INSERT OR IGNORE INTO Channels (rss_id, id_channel, counter) VALUES (?1, ?2, 0)",
            params![feed_id, source_id],
        )?;

        tx.commit()?;
        Ok(source_id)
    }

    /// The tracking row with the smallest scheduled time, if any
    pub fn earliest_due(&self) -> StorageResult<Option<DueSource>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT rss_id, last_video_id, ts, ts_read FROM Channels
                 WHERE ts IS NOT NULL ORDER BY ts ASC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        // A ts that does not map to a valid instant is treated like no row;
        // the loop sees rows exist and takes the inconsistent-state path.
        Ok(row.and_then(|(feed_id, last_seen_item_id, ts, display)| {
            Some(DueSource {
                feed_id,
                last_seen_item_id,
                next_due_at: instant_from_stored(ts)?,
                next_due_display: display,
            })
        }))
    }

    /// Whether any tracking row has a scheduled time
    pub fn has_any_scheduled(&self) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM Channels WHERE ts IS NOT NULL LIMIT 1",
                [],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Every tracking row in sweep order: fewest no-new outcomes first, then
    /// earliest due, unscheduled rows ahead of scheduled ones
    pub fn sweep_order(&self) -> StorageResult<Vec<TrackingState>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRACKING_COLUMNS} FROM Channels ORDER BY counter ASC, ts ASC NULLS FIRST"
        ))?;
        let rows = stmt
            .query_map([], tracking_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Tracking state of one source
    pub fn tracking(&self, feed_id: &str) -> StorageResult<Option<TrackingState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                &format!("SELECT {TRACKING_COLUMNS} FROM Channels WHERE rss_id = ?1"),
                params![feed_id],
                tracking_from_row,
            )
            .optional()?;
        Ok(state)
    }

    /// Persist a successful discovery in one transaction
    ///
    /// Upserts the source record, replaces the tracking schedule (counter back
    /// to 0, watermark advanced) and inserts each new item if its url is not
    /// already known. Returns how many items were actually inserted.
    pub fn record_discovery(
        &self,
        feed_id: &str,
        feed: &FetchedFeed,
        next: &NextCheck,
    ) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let source_id = upsert_source(&tx, &feed.source_name, &feed.source_url)?;

        tx.execute(
            "INSERT INTO Channels (rss_id, last_video_id, ts, ts_read, rank, counter, id_channel)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
             ON CONFLICT(rss_id) DO UPDATE SET
                last_video_id = excluded.last_video_id,
                ts = excluded.ts,
                ts_read = excluded.ts_read,
                rank = excluded.rank,
                counter = 0,
                id_channel = excluded.id_channel",
            params![
                feed_id,
                feed.latest_item_id,
                next.at.timestamp(),
                next.display,
                next.rank.as_str(),
                source_id,
            ],
        )?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO Result (title, video_url, thumbnail, channel_id, published_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for item in &feed.new_items {
                let published_at = item.published_at.map(|at| at.to_rfc3339());
                inserted += stmt.execute(params![
                    item.title,
                    item.url,
                    item.thumbnail,
                    source_id,
                    published_at,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Persist a no-new outcome; returns the number of tracking rows updated
    pub fn record_no_new(
        &self,
        feed_id: &str,
        counter: u32,
        rank: Rank,
        next: &NextCheck,
    ) -> StorageResult<usize> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE Channels SET counter = ?1, rank = ?2, ts = ?3, ts_read = ?4 WHERE rss_id = ?5",
            params![counter, rank.as_str(), next.at.timestamp(), next.display, feed_id],
        )?;
        Ok(updated)
    }

    /// Every discovered item, most recently published first
    pub fn discovered_items(&self) -> StorageResult<Vec<DiscoveredItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT title, video_url, thumbnail, channel_id, published_at, seen
             FROM Result ORDER BY published_at DESC, video_url ASC",
        )?;
        let items = stmt
            .query_map([], |row| {
                Ok(DiscoveredItem {
                    title: row.get(0)?,
                    url: row.get(1)?,
                    thumbnail: row.get(2)?,
                    source_id: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
                    published_at: row.get(4)?,
                    seen: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Every source with its tracking state, soonest due first
    pub fn tracking_overview(&self) -> StorageResult<Vec<SourceStatus>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.rss_id, c.last_video_id, c.ts, c.ts_read, c.rank, c.counter, c.id_channel,
                    s.channel_name, s.channel_url, s.channel_logo
             FROM Channels c JOIN Channel s ON s.id_channel = c.id_channel
             ORDER BY c.ts ASC NULLS FIRST, c.rss_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let tracking = tracking_from_row(row)?;
                Ok(SourceStatus {
                    source: SourceRecord {
                        id: tracking.source_id,
                        name: row.get(7)?,
                        url: row.get(8)?,
                        logo: row.get(9)?,
                    },
                    tracking,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn upsert_source(conn: &Connection, name: &str, url: &str) -> StorageResult<i64> {
    conn.execute(
        "INSERT INTO Channel (channel_name, channel_url) VALUES (?1, ?2)
         ON CONFLICT(channel_url) DO UPDATE SET channel_name = excluded.channel_name",
        params![name, url],
    )?;

    conn.query_row(
        "SELECT id_channel FROM Channel WHERE channel_url = ?1",
        params![url],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StorageError::MissingSource {
        url: url.to_string(),
    })
}

/// `ts` is written as whole epoch seconds but other writers may store a REAL
fn instant_from_stored(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() {
        return None;
    }
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
}

fn tracking_from_row(row: &Row<'_>) -> rusqlite::Result<TrackingState> {
    let counter = row.get::<_, Option<i64>>(5)?.unwrap_or(0);
    Ok(TrackingState {
        feed_id: row.get(0)?,
        last_seen_item_id: row.get(1)?,
        next_due_at: row.get::<_, Option<f64>>(2)?.and_then(instant_from_stored),
        next_due_display: row.get(3)?,
        rank: Rank::from_stored(row.get::<_, Option<String>>(4)?.as_deref()),
        no_new_counter: u32::try_from(counter).unwrap_or(0),
        source_id: row.get(6)?,
    })
}
