//! The reconciliation engine: decides, per row, whether to create, update
//! or leave a content record alone, and performs the writes.
//!
//! Planning ([`Reconciler::plan`]) is read-only and shared by real syncs and
//! dry-run previews; [`Reconciler::apply`] carries out a plan.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use sheetsync_shared::{PostStatus, RecordId, RecordSummary, RecordWrite, SheetConfig, SyncSettings};
use sheetsync_source::Row;

use crate::collab::{ContentStore, ImageAttacher, Taxonomy};
use crate::fingerprint::{FINGERPRINT_META_KEY, FingerprintInput, fingerprint};
use crate::resolve::{ResolvedRow, SkipReason, resolve_row};

/// What a plan would do to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update(RecordId),
    Unchanged(RecordId),
}

/// A fully resolved row plus the decision taken for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPlan {
    pub row: ResolvedRow,
    pub action: Action,
    /// Final status after policy and schedule checks.
    pub status: PostStatus,
    /// Date that participates in the fingerprint.
    pub date: Option<DateTime<Utc>>,
    /// Date to send with the write; `None` keeps what the store has.
    pub write_date: Option<DateTime<Utc>>,
    pub fingerprint: String,
}

/// Terminal state of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Created(RecordId),
    Updated(RecordId),
    Unchanged(RecordId),
    Skipped(SkipReason),
}

impl RowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Unchanged(_) => "unchanged",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// Result of the featured-image step, counted apart from the row outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageOutcome {
    #[default]
    NotAttempted,
    Set,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    pub outcome: RowOutcome,
    pub image: ImageOutcome,
}

impl From<SkipReason> for RowResult {
    fn from(reason: SkipReason) -> Self {
        Self {
            outcome: RowOutcome::Skipped(reason),
            image: ImageOutcome::NotAttempted,
        }
    }
}

/// Reconciles rows of one sheet against a content store.
pub struct Reconciler<'a, S> {
    sheet: &'a SheetConfig,
    settings: &'a SyncSettings,
    store: &'a S,
    now: DateTime<Utc>,
}

impl<'a, S: ContentStore> Reconciler<'a, S> {
    pub fn new(sheet: &'a SheetConfig, settings: &'a SyncSettings, store: &'a S) -> Self {
        Self {
            sheet,
            settings,
            store,
            now: Utc::now(),
        }
    }

    /// Pin the clock used for schedule checks.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Resolve a row and decide what to do with it. Performs no writes.
    pub async fn plan(&self, row: &Row<'_>) -> Result<RowPlan, SkipReason> {
        let resolved = resolve_row(self.sheet, row)?;

        let existing = self.find_existing(&resolved.title).await?;
        let (status, date, write_date) = self.resolve_schedule(&resolved, existing.as_ref());

        let date_text = date.map(|d| d.to_rfc3339()).unwrap_or_default();
        let sheet_id = self.sheet.id.to_string();
        let fingerprint = fingerprint(&FingerprintInput {
            source: &sheet_id,
            mode: self.sheet.mode.as_str(),
            template: self.sheet.effective_template(),
            title: &resolved.title,
            content: &resolved.content_html,
            category: &resolved.category,
            tags: &resolved.tags_raw,
            image_url: &resolved.image_raw,
            status: status.as_str(),
            date: &date_text,
        });

        let action = match existing {
            None => Action::Create,
            Some((id, _)) => {
                let stored = self
                    .store
                    .get_metadata(id, FINGERPRINT_META_KEY)
                    .await
                    .map_err(|e| SkipReason::Lookup(e.to_string()))?;
                if stored.as_deref() == Some(fingerprint.as_str()) {
                    Action::Unchanged(id)
                } else {
                    Action::Update(id)
                }
            }
        };

        Ok(RowPlan {
            row: resolved,
            action,
            status,
            date,
            write_date,
            fingerprint,
        })
    }

    async fn find_existing(
        &self,
        title: &str,
    ) -> Result<Option<(RecordId, RecordSummary)>, SkipReason> {
        let lookup = |e: sheetsync_shared::SheetSyncError| SkipReason::Lookup(e.to_string());

        let Some(id) = self
            .store
            .find_by_exact_title(title, &self.sheet.target_type)
            .await
            .map_err(lookup)?
        else {
            return Ok(None);
        };

        Ok(self
            .store
            .get_record(id)
            .await
            .map_err(lookup)?
            .map(|summary| (id, summary)))
    }

    /// Settle status and date. Returns `(status, fingerprint date, write date)`.
    fn resolve_schedule(
        &self,
        row: &ResolvedRow,
        existing: Option<&(RecordId, RecordSummary)>,
    ) -> (PostStatus, Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let status = match existing {
            Some((_, summary)) if self.settings.force_status_from_sheet => {
                row.row_status.unwrap_or(summary.status)
            }
            Some((_, summary)) => summary.status,
            None => row.row_status.unwrap_or(self.settings.default_status),
        };

        if status != PostStatus::Future {
            return (status, None, None);
        }

        let earliest = self.now
            + chrono::Duration::from_std(self.settings.schedule_buffer)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let row_date = row.row_date.filter(|d| *d >= earliest);

        if let Some(date) = row_date {
            return (status, Some(date), Some(date));
        }

        // An existing record may stay scheduled only on a date still ahead.
        if let Some((_, summary)) = existing {
            if let Some(date) = summary.date.filter(|d| *d >= earliest) {
                return (status, Some(date), None);
            }
            if summary.status != PostStatus::Future {
                debug!(title = %row.title, "no usable future date, keeping current status");
                return (summary.status, None, None);
            }
        }

        debug!(title = %row.title, "no usable future date, using default status");
        (self.fallback_status(), None, None)
    }

    /// Status for a row that cannot be scheduled.
    fn fallback_status(&self) -> PostStatus {
        match self.settings.default_status {
            PostStatus::Future => PostStatus::Draft,
            status => status,
        }
    }

    /// Carry out a plan: write the record, its fingerprint, and on
    /// create/update its category, tags and featured image.
    #[instrument(skip_all, fields(title = %plan.row.title))]
    pub async fn apply<T, I>(&self, plan: RowPlan, taxonomy: &T, images: &I) -> RowResult
    where
        T: Taxonomy,
        I: ImageAttacher,
    {
        let write = RecordWrite {
            title: plan.row.title.clone(),
            content_html: plan.row.content_html.clone(),
            status: plan.status,
            content_type: self.sheet.target_type.clone(),
            date: plan.write_date,
        };

        let (id, outcome) = match plan.action {
            Action::Unchanged(id) => {
                return RowResult {
                    outcome: RowOutcome::Unchanged(id),
                    image: ImageOutcome::NotAttempted,
                };
            }
            Action::Update(id) => match self.store.update(id, &write).await {
                Ok(()) => (id, RowOutcome::Updated(id)),
                Err(e) => return SkipReason::UpdateRejected(e.to_string()).into(),
            },
            Action::Create => match self.store.create(&write).await {
                Ok(id) => (id, RowOutcome::Created(id)),
                Err(e) => return SkipReason::CreateRejected(e.to_string()).into(),
            },
        };
        debug!(record = %id, outcome = outcome.label(), "record written");

        if let Err(e) = self
            .store
            .set_metadata(id, FINGERPRINT_META_KEY, &plan.fingerprint)
            .await
        {
            warn!(record = %id, error = %e, "failed to store row fingerprint");
        }

        if !plan.row.category.is_empty() {
            let assigned = match taxonomy.ensure_category(&plan.row.category).await {
                Ok(term) => taxonomy.assign_category(id, term).await,
                Err(e) => Err(e),
            };
            if let Err(e) = assigned {
                warn!(record = %id, category = %plan.row.category, error = %e, "category not assigned");
            }
        }

        if !plan.row.tags.is_empty() {
            if let Err(e) = taxonomy.assign_tags(id, &plan.row.tags).await {
                warn!(record = %id, error = %e, "tags not assigned");
            }
        }

        let image = match &plan.row.image_url {
            None => ImageOutcome::NotAttempted,
            Some(url) => match images.attach_featured_image(id, url).await {
                Ok(()) => ImageOutcome::Set,
                Err(e) => {
                    warn!(record = %id, %url, error = %e, "featured image failed");
                    ImageOutcome::Failed
                }
            },
        };

        RowResult { outcome, image }
    }

    /// Plan and apply one row.
    pub async fn reconcile<T, I>(&self, row: &Row<'_>, taxonomy: &T, images: &I) -> RowResult
    where
        T: Taxonomy,
        I: ImageAttacher,
    {
        match self.plan(row).await {
            Ok(plan) => self.apply(plan, taxonomy, images).await,
            Err(reason) => reason.into(),
        }
    }
}
