//! Boundary contracts the reconciliation engine talks to, plus the
//! implementations backed by [`HttpFetcher`] and [`Storage`].
//!
//! The engine is generic over these traits so tests can swap in in-memory
//! fakes without touching the network or a database.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use url::Url;

use sheetsync_shared::{RecordId, RecordSummary, RecordWrite, Result, TermId};
use sheetsync_source::HttpFetcher;
use sheetsync_storage::{CATEGORY_TAXONOMY, Storage, TAG_TAXONOMY};

/// Downloads a sheet's raw CSV text.
pub trait SourceFetcher {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// Reads and writes content records.
pub trait ContentStore {
    /// Exact-title lookup within a content type. At most one id is returned.
    async fn find_by_exact_title(&self, title: &str, content_type: &str)
    -> Result<Option<RecordId>>;

    async fn create(&self, record: &RecordWrite) -> Result<RecordId>;

    async fn update(&self, id: RecordId, record: &RecordWrite) -> Result<()>;

    async fn get_metadata(&self, id: RecordId, key: &str) -> Result<Option<String>>;

    async fn set_metadata(&self, id: RecordId, key: &str, value: &str) -> Result<()>;

    async fn get_record(&self, id: RecordId) -> Result<Option<RecordSummary>>;
}

/// Category and tag assignment.
pub trait Taxonomy {
    /// Return the category's id, creating it if absent.
    async fn ensure_category(&self, name: &str) -> Result<TermId>;

    /// Replace the record's category with `category`.
    async fn assign_category(&self, id: RecordId, category: TermId) -> Result<()>;

    /// Replace the record's tags with `tags`.
    async fn assign_tags(&self, id: RecordId, tags: &[String]) -> Result<()>;
}

/// Attaches a featured image to a record.
///
/// Implementations must be idempotent: a second call with the same URL for
/// a record that already has the image attached does nothing.
pub trait ImageAttacher {
    async fn attach_featured_image(&self, id: RecordId, image_url: &Url) -> Result<()>;
}

/// Named mutual-exclusion guard for batch syncs.
pub trait SyncLock {
    /// Take the lock without waiting. `false` means someone else holds it.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool>;

    async fn release(&self, name: &str, holder: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        self.fetch_text(url).await
    }
}

// ---------------------------------------------------------------------------
// libSQL
// ---------------------------------------------------------------------------

impl ContentStore for Storage {
    async fn find_by_exact_title(
        &self,
        title: &str,
        content_type: &str,
    ) -> Result<Option<RecordId>> {
        self.find_record_by_title(title, content_type).await
    }

    async fn create(&self, record: &RecordWrite) -> Result<RecordId> {
        self.insert_record(record).await
    }

    async fn update(&self, id: RecordId, record: &RecordWrite) -> Result<()> {
        self.update_record(id, record).await
    }

    async fn get_metadata(&self, id: RecordId, key: &str) -> Result<Option<String>> {
        self.get_meta(id, key).await
    }

    async fn set_metadata(&self, id: RecordId, key: &str, value: &str) -> Result<()> {
        self.set_meta(id, key, value).await
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<RecordSummary>> {
        Ok(Storage::get_record(self, id)
            .await?
            .map(|record| RecordSummary {
                status: record.status,
                date: record.published_at,
            }))
    }
}

impl Taxonomy for Storage {
    async fn ensure_category(&self, name: &str) -> Result<TermId> {
        self.ensure_term(CATEGORY_TAXONOMY, name).await
    }

    async fn assign_category(&self, id: RecordId, category: TermId) -> Result<()> {
        self.set_record_terms(id, CATEGORY_TAXONOMY, &[category]).await
    }

    async fn assign_tags(&self, id: RecordId, tags: &[String]) -> Result<()> {
        let mut terms = Vec::with_capacity(tags.len());
        for tag in tags {
            terms.push(self.ensure_term(TAG_TAXONOMY, tag).await?);
        }
        self.set_record_terms(id, TAG_TAXONOMY, &terms).await
    }
}

impl SyncLock for Storage {
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        self.try_acquire_lock(name, holder, ttl).await
    }

    async fn release(&self, name: &str, holder: &str) -> Result<()> {
        self.release_lock(name, holder).await
    }
}
