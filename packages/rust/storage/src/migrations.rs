//! SQL migration definitions for the sheetsync content database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: records, record_meta, terms, record_terms, sync_locks",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Content records ("posts")
CREATE TABLE IF NOT EXISTS records (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    content_type TEXT NOT NULL,
    title        TEXT NOT NULL,
    content      TEXT NOT NULL,
    status       TEXT NOT NULL,
    published_at TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_type_title ON records(content_type, title);

-- Per-record key/value metadata (row fingerprints, image URLs)
CREATE TABLE IF NOT EXISTS record_meta (
    record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    key       TEXT NOT NULL,
    value     TEXT NOT NULL,
    PRIMARY KEY (record_id, key)
);

-- Taxonomy terms (categories, tags)
CREATE TABLE IF NOT EXISTS terms (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    taxonomy TEXT NOT NULL,
    name     TEXT NOT NULL,
    UNIQUE(taxonomy, name)
);

-- Record ↔ term assignments
CREATE TABLE IF NOT EXISTS record_terms (
    record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    term_id   INTEGER NOT NULL REFERENCES terms(id) ON DELETE CASCADE,
    taxonomy  TEXT NOT NULL,
    position  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (record_id, term_id)
);

CREATE INDEX IF NOT EXISTS idx_record_terms_record ON record_terms(record_id, taxonomy);

-- Short-lived named locks guarding batch syncs
CREATE TABLE IF NOT EXISTS sync_locks (
    name       TEXT PRIMARY KEY,
    holder     TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
