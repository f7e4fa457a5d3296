//! libSQL-backed content store (offline mode).
//!
//! The [`Storage`] struct wraps a local libSQL database holding content
//! records, per-record metadata, taxonomy terms and their assignments, and
//! the named locks that keep two batch syncs from overlapping.
//!
//! Record writes that the store rejects surface as
//! [`SheetSyncError::StoreWrite`]; everything else maps to
//! [`SheetSyncError::Storage`].

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use sheetsync_shared::{PostStatus, RecordId, RecordWrite, Result, SheetSyncError, TermId};

/// Taxonomy name for categories.
pub const CATEGORY_TAXONOMY: &str = "category";

/// Taxonomy name for tags.
pub const TAG_TAXONOMY: &str = "tag";

/// A content record as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub content_type: String,
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

fn storage_err(e: impl std::fmt::Display) -> SheetSyncError {
    SheetSyncError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SheetSyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SheetSyncError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Record operations
    // -----------------------------------------------------------------------

    /// Find a record by exact (case-sensitive) title within a content type.
    ///
    /// When several records share the title, the oldest one wins.
    pub async fn find_record_by_title(
        &self,
        title: &str,
        content_type: &str,
    ) -> Result<Option<RecordId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM records WHERE content_type = ?1 AND title = ?2
                 ORDER BY id LIMIT 1",
                params![content_type, title],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(RecordId(row.get::<i64>(0).map_err(storage_err)?))),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Insert a new record. Returns its id.
    pub async fn insert_record(&self, record: &RecordWrite) -> Result<RecordId> {
        validate_write(record)?;
        let now = Utc::now().to_rfc3339();
        let published_at = record.date.map(|d| d.to_rfc3339());
        self.conn
            .execute(
                "INSERT INTO records (content_type, title, content, status, published_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.content_type.as_str(),
                    record.title.as_str(),
                    record.content_html.as_str(),
                    record.status.as_str(),
                    published_at.as_deref(),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| SheetSyncError::StoreWrite(e.to_string()))?;

        Ok(RecordId(self.conn.last_insert_rowid()))
    }

    /// Overwrite an existing record. A `None` date keeps the stored date.
    pub async fn update_record(&self, id: RecordId, record: &RecordWrite) -> Result<()> {
        validate_write(record)?;
        let now = Utc::now().to_rfc3339();
        let published_at = record.date.map(|d| d.to_rfc3339());
        let affected = self
            .conn
            .execute(
                "UPDATE records SET
                   content_type = ?1,
                   title = ?2,
                   content = ?3,
                   status = ?4,
                   published_at = COALESCE(?5, published_at),
                   updated_at = ?6
                 WHERE id = ?7",
                params![
                    record.content_type.as_str(),
                    record.title.as_str(),
                    record.content_html.as_str(),
                    record.status.as_str(),
                    published_at.as_deref(),
                    now.as_str(),
                    id.0,
                ],
            )
            .await
            .map_err(|e| SheetSyncError::StoreWrite(e.to_string()))?;

        if affected == 0 {
            return Err(SheetSyncError::StoreWrite(format!("record {id} not found")));
        }
        Ok(())
    }

    /// Get a record by id.
    pub async fn get_record(&self, id: RecordId) -> Result<Option<StoredRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content_type, title, content, status, published_at
                 FROM records WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Read one metadata value.
    pub async fn get_meta(&self, id: RecordId, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM record_meta WHERE record_id = ?1 AND key = ?2",
                params![id.0, key],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Write one metadata value (upserts).
    pub async fn set_meta(&self, id: RecordId, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO record_meta (record_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(record_id, key) DO UPDATE SET value = excluded.value",
                params![id.0, key, value],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Taxonomy
    // -----------------------------------------------------------------------

    /// Return the id of a term, creating it if absent.
    pub async fn ensure_term(&self, taxonomy: &str, name: &str) -> Result<TermId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SheetSyncError::validation("term name is empty"));
        }

        self.conn
            .execute(
                "INSERT OR IGNORE INTO terms (taxonomy, name) VALUES (?1, ?2)",
                params![taxonomy, name],
            )
            .await
            .map_err(storage_err)?;

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM terms WHERE taxonomy = ?1 AND name = ?2",
                params![taxonomy, name],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(TermId(row.get::<i64>(0).map_err(storage_err)?)),
            Ok(None) => Err(SheetSyncError::Storage(format!(
                "term {taxonomy}/{name} missing after insert"
            ))),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Replace a record's assignments in one taxonomy.
    pub async fn set_record_terms(
        &self,
        id: RecordId,
        taxonomy: &str,
        terms: &[TermId],
    ) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM record_terms WHERE record_id = ?1 AND taxonomy = ?2",
                params![id.0, taxonomy],
            )
            .await
            .map_err(storage_err)?;

        for (position, term) in terms.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO record_terms (record_id, term_id, taxonomy, position)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id.0, term.0, taxonomy, position as i64],
                )
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Names of the terms assigned to a record, in assignment order.
    pub async fn record_terms(&self, id: RecordId, taxonomy: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.name FROM record_terms rt
                 JOIN terms t ON t.id = rt.term_id
                 WHERE rt.record_id = ?1 AND rt.taxonomy = ?2
                 ORDER BY rt.position",
                params![id.0, taxonomy],
            )
            .await
            .map_err(storage_err)?;

        let mut names = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            names.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(names)
    }

    // -----------------------------------------------------------------------
    // Sync locks
    // -----------------------------------------------------------------------

    /// Try to take the named lock for `ttl`. Expired locks are reclaimed.
    /// Returns `false` without waiting if someone else holds it.
    pub async fn try_acquire_lock(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now().timestamp();
        let expires_at = now + ttl.as_secs() as i64;

        self.conn
            .execute(
                "DELETE FROM sync_locks WHERE name = ?1 AND expires_at <= ?2",
                params![name, now],
            )
            .await
            .map_err(storage_err)?;

        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO sync_locks (name, holder, expires_at) VALUES (?1, ?2, ?3)",
                params![name, holder, expires_at],
            )
            .await
            .map_err(storage_err)?;

        Ok(inserted == 1)
    }

    /// Release the named lock if `holder` still owns it.
    pub async fn release_lock(&self, name: &str, holder: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sync_locks WHERE name = ?1 AND holder = ?2",
                params![name, holder],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

fn validate_write(record: &RecordWrite) -> Result<()> {
    if record.title.trim().is_empty() {
        return Err(SheetSyncError::StoreWrite("title is empty".into()));
    }
    if record.content_type.trim().is_empty() {
        return Err(SheetSyncError::StoreWrite("content type is empty".into()));
    }
    Ok(())
}

/// Convert a database row to a [`StoredRecord`].
fn row_to_record(row: &libsql::Row) -> Result<StoredRecord> {
    let status: String = row.get(4).map_err(storage_err)?;
    let status = PostStatus::parse(&status)
        .ok_or_else(|| SheetSyncError::Storage(format!("unknown record status: {status}")))?;

    let published_at = match row.get::<String>(5).ok() {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SheetSyncError::Storage(format!("invalid date: {e}")))?,
        ),
        None => None,
    };

    Ok(StoredRecord {
        id: RecordId(row.get::<i64>(0).map_err(storage_err)?),
        content_type: row.get::<String>(1).map_err(storage_err)?,
        title: row.get::<String>(2).map_err(storage_err)?,
        content: row.get::<String>(3).map_err(storage_err)?,
        status,
        published_at,
    })
}
