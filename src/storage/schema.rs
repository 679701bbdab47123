//! Catalog schema
//!
//! `Channel` holds source records, `Channels` the per-source tracking state
//! and `Result` every discovered item. The categorization columns on
//! `Channel` belong to the dashboard and are never read or written here.

use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Channel (
    id_channel INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_name TEXT NOT NULL,
    channel_url TEXT NOT NULL UNIQUE,
    channel_logo TEXT,
    id_domain INTEGER,
    id_subdomain INTEGER
);

CREATE TABLE IF NOT EXISTS Channels (
    rss_id TEXT PRIMARY KEY,
    last_video_id TEXT,
    ts INTEGER,
    ts_read TEXT,
    rank TEXT,
    counter INTEGER NOT NULL DEFAULT 0,
    id_channel INTEGER NOT NULL UNIQUE
        REFERENCES Channel(id_channel) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_channels_ts ON Channels(ts);

CREATE TABLE IF NOT EXISTS Result (
    video_url TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    thumbnail TEXT,
    channel_id INTEGER REFERENCES Channel(id_channel) ON DELETE CASCADE,
    seen INTEGER NOT NULL DEFAULT 0,
    published_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_result_channel ON Result(channel_id);
";

/// Create every catalog table and index that does not exist yet
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["Channel", "Channels", "Result"]);
    }
}
