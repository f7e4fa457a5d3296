//! In-memory collaborators for engine and sync tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use sheetsync_shared::{
    PostStatus, RecordId, RecordSummary, RecordWrite, Result, SheetSyncError, TermId,
};

use crate::collab::{ContentStore, ImageAttacher, SourceFetcher, SyncLock, Taxonomy};

#[derive(Default)]
struct StoreState {
    records: Vec<RecordWrite>,
    meta: HashMap<(i64, String), String>,
    terms: Vec<String>,
    categories: HashMap<i64, String>,
    tags: HashMap<i64, Vec<String>>,
    writes: usize,
    category_assignments: usize,
}

/// Which store calls fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Fault {
    #[default]
    None,
    /// `create` and `update`.
    Writes,
    /// `find_by_exact_title`.
    Find,
    /// `get_metadata`.
    Metadata,
}

/// Content store and taxonomy backed by vectors. Record ids are 1-based
/// positions.
#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<StoreState>,
    fault: Fault,
}

impl FakeStore {
    pub fn rejecting() -> Self {
        Self::failing(Fault::Writes)
    }

    pub fn failing(fault: Fault) -> Self {
        Self {
            fault,
            ..Self::default()
        }
    }

    pub fn metadata(&self, id: RecordId, key: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.meta.get(&(id.0, key.to_string())).cloned()
    }

    /// Insert a record directly, bypassing write counting.
    pub fn seed(&self, title: &str, status: PostStatus, date: Option<DateTime<Utc>>) -> RecordId {
        let mut state = self.state.lock().unwrap();
        state.records.push(RecordWrite {
            title: title.into(),
            content_html: "<p>seeded</p>".into(),
            status,
            content_type: "post".into(),
            date,
        });
        RecordId(state.records.len() as i64)
    }

    pub fn record(&self, id: RecordId) -> Option<RecordWrite> {
        let state = self.state.lock().unwrap();
        state.records.get(id.0 as usize - 1).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn category(&self, id: RecordId) -> Option<String> {
        self.state.lock().unwrap().categories.get(&id.0).cloned()
    }

    pub fn tags(&self, id: RecordId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tags
            .get(&id.0)
            .cloned()
            .unwrap_or_default()
    }

    pub fn categories_assigned(&self) -> usize {
        self.state.lock().unwrap().category_assignments
    }
}

impl ContentStore for FakeStore {
    async fn find_by_exact_title(
        &self,
        title: &str,
        content_type: &str,
    ) -> Result<Option<RecordId>> {
        if self.fault == Fault::Find {
            return Err(SheetSyncError::Storage("lookup unavailable".into()));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .position(|r| r.title == title && r.content_type == content_type)
            .map(|i| RecordId(i as i64 + 1)))
    }

    async fn create(&self, record: &RecordWrite) -> Result<RecordId> {
        if self.fault == Fault::Writes {
            return Err(SheetSyncError::StoreWrite("read-only store".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.records.push(record.clone());
        state.writes += 1;
        Ok(RecordId(state.records.len() as i64))
    }

    async fn update(&self, id: RecordId, record: &RecordWrite) -> Result<()> {
        if self.fault == Fault::Writes {
            return Err(SheetSyncError::StoreWrite("read-only store".into()));
        }
        let mut state = self.state.lock().unwrap();
        let slot = state
            .records
            .get_mut(id.0 as usize - 1)
            .ok_or_else(|| SheetSyncError::StoreWrite(format!("no record {id}")))?;
        let date = record.date.or(slot.date);
        *slot = RecordWrite {
            date,
            ..record.clone()
        };
        state.writes += 1;
        Ok(())
    }

    async fn get_metadata(&self, id: RecordId, key: &str) -> Result<Option<String>> {
        if self.fault == Fault::Metadata {
            return Err(SheetSyncError::Storage("metadata unavailable".into()));
        }
        Ok(self.metadata(id, key))
    }

    async fn set_metadata(&self, id: RecordId, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.meta.insert((id.0, key.to_string()), value.to_string());
        Ok(())
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<RecordSummary>> {
        Ok(self.record(id).map(|r| RecordSummary {
            status: r.status,
            date: r.date,
        }))
    }
}

impl Taxonomy for FakeStore {
    async fn ensure_category(&self, name: &str) -> Result<TermId> {
        let mut state = self.state.lock().unwrap();
        let index = match state.terms.iter().position(|t| t == name) {
            Some(i) => i,
            None => {
                state.terms.push(name.to_string());
                state.terms.len() - 1
            }
        };
        Ok(TermId(index as i64))
    }

    async fn assign_category(&self, id: RecordId, category: TermId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let name = state.terms[category.0 as usize].clone();
        state.categories.insert(id.0, name);
        state.category_assignments += 1;
        Ok(())
    }

    async fn assign_tags(&self, id: RecordId, tags: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.tags.insert(id.0, tags.to_vec());
        Ok(())
    }
}

/// Image attacher that records calls and optionally fails them.
#[derive(Default)]
pub(crate) struct FakeImages {
    attached: Mutex<Vec<(RecordId, String)>>,
    fail: bool,
}

impl FakeImages {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn attached(&self) -> Vec<(RecordId, String)> {
        self.attached.lock().unwrap().clone()
    }
}

impl ImageAttacher for FakeImages {
    async fn attach_featured_image(&self, id: RecordId, image_url: &Url) -> Result<()> {
        if self.fail {
            return Err(SheetSyncError::ImageAttach(format!("{image_url}: refused")));
        }
        self.attached
            .lock()
            .unwrap()
            .push((id, image_url.to_string()));
        Ok(())
    }
}

/// Serves fixed bodies keyed by URL; unknown URLs fail like a 404.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    bodies: HashMap<String, String>,
}

impl FakeFetcher {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }
}

impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        self.bodies
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| SheetSyncError::SourceFetch(format!("{url}: HTTP 404 Not Found")))
    }
}

/// Single-slot lock.
#[derive(Default)]
pub(crate) struct FakeLock {
    holder: Mutex<Option<String>>,
}

impl FakeLock {
    pub fn held_by(holder: &str) -> Self {
        Self {
            holder: Mutex::new(Some(holder.to_string())),
        }
    }

    pub fn is_held(&self) -> bool {
        self.holder.lock().unwrap().is_some()
    }
}

impl SyncLock for FakeLock {
    async fn try_acquire(&self, _name: &str, holder: &str, _ttl: Duration) -> Result<bool> {
        let mut slot = self.holder.lock().unwrap();
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(holder.to_string());
        Ok(true)
    }

    async fn release(&self, _name: &str, holder: &str) -> Result<()> {
        let mut slot = self.holder.lock().unwrap();
        if slot.as_deref() == Some(holder) {
            *slot = None;
        }
        Ok(())
    }
}
