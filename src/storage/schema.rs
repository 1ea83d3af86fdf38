//! Database schema definitions
//!
//! Two databases are used: the record store written by the relational sink,
//! and the crawl-state store that keeps the frontier and seen-set between
//! runs.

/// Record tables, one per record kind, keyed by natural key
///
/// Tag and saver lists are stored as JSON arrays so their order survives.
pub const RECORDS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS PIN (
    bookmark_id INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    url_slug TEXT NOT NULL,
    url_count INTEGER NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    tags TEXT NOT NULL,
    author TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pin_slug ON PIN(url_slug);
CREATE INDEX IF NOT EXISTS idx_pin_author ON PIN(author);

CREATE TABLE IF NOT EXISTS URLSLUG (
    url_slug TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    canonical_link TEXT,
    co_savers TEXT NOT NULL,
    co_saver_count INTEGER NOT NULL,
    tags_union TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS PAGE (
    url_slug TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    content_text TEXT NOT NULL,
    content_size INTEGER NOT NULL
);
"#;

/// Crawl-state tables
pub const STATE_SCHEMA_SQL: &str = r#"
-- Requests admitted but not yet handed to a worker
CREATE TABLE IF NOT EXISTS frontier (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    priority INTEGER NOT NULL,
    request TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_frontier_priority ON frontier(priority, seq);

-- Dedup keys for the persistent strategy
CREATE TABLE IF NOT EXISTS seen (
    kind TEXT NOT NULL,
    key TEXT NOT NULL,
    PRIMARY KEY (kind, key)
) WITHOUT ROWID;
"#;

/// Initializes the record tables
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_records_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(RECORDS_SCHEMA_SQL)?;
    Ok(())
}

/// Initializes the crawl-state tables
pub fn initialize_state_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(STATE_SCHEMA_SQL)?;
    Ok(())
}
