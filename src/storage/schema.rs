use rusqlite::Connection;

/// Keys the catalog snapshots are stored under
pub mod keys {
    pub const SONGS: &str = "songs";
    pub const AUDIO: &str = "audioData";
}

pub mod tables {
    pub const KV: &str = "kv";

    pub const ALL_TABLES: &[&str] = &[KV];
}

pub mod columns {
    pub const KEY: &str = "key";
    pub const VALUE: &str = "value";
}

pub use columns::*;
pub use tables::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
