//! Sheet-level sync: batch runs over every configured sheet and single-row
//! dry-run previews.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use sheetsync_shared::{PostStatus, Result, SheetConfig, SheetMode, SheetSyncError, SyncSettings};
use sheetsync_source::{Table, export_url};

use crate::collab::{ContentStore, ImageAttacher, SourceFetcher, SyncLock, Taxonomy};
use crate::engine::{Action, ImageOutcome, Reconciler, RowOutcome, RowResult};
use crate::resolve::{CONTENT_COLUMN, TITLE_COLUMN};

/// Lock name shared by every batch sync, however it was triggered.
pub const SYNC_LOCK_NAME: &str = "sheetsync_batch_sync";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Counters for one sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetReport {
    pub sheet_id: String,
    pub sheet_name: String,
    /// Data rows in the fetched sheet.
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub images_set: usize,
    pub images_failed: usize,
    /// Rows were left unprocessed because the run was cancelled.
    pub cancelled: bool,
    /// Source-level failure; no rows were processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SheetReport {
    fn new(sheet: &SheetConfig) -> Self {
        Self {
            sheet_id: sheet.id.to_string(),
            sheet_name: sheet.name.clone(),
            ..Self::default()
        }
    }

    fn record(&mut self, result: &RowResult) {
        match result.outcome {
            RowOutcome::Created(_) => self.created += 1,
            RowOutcome::Updated(_) => self.updated += 1,
            RowOutcome::Unchanged(_) => self.unchanged += 1,
            RowOutcome::Skipped(_) => self.skipped += 1,
        }
        match result.image {
            ImageOutcome::Set => self.images_set += 1,
            ImageOutcome::Failed => self.images_failed += 1,
            ImageOutcome::NotAttempted => {}
        }
    }
}

/// Result of [`run_batch_sync`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchSyncLog {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Another run held the sync lock; nothing was done.
    pub lock_busy: bool,
    pub reports: Vec<SheetReport>,
}

impl BatchSyncLog {
    /// Sum of the per-sheet counters.
    pub fn totals(&self) -> SheetReport {
        let mut totals = SheetReport {
            sheet_name: "total".into(),
            ..SheetReport::default()
        };
        for r in &self.reports {
            totals.rows += r.rows;
            totals.created += r.created;
            totals.updated += r.updated;
            totals.unchanged += r.unchanged;
            totals.skipped += r.skipped;
            totals.images_set += r.images_set;
            totals.images_failed += r.images_failed;
            totals.cancelled |= r.cancelled;
        }
        totals
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting sync status.
pub trait SyncProgress: Send + Sync {
    /// Called once a sheet has been fetched and parsed.
    fn sheet_started(&self, sheet: &SheetConfig, rows: usize);
    /// Called after each row.
    fn row_done(&self, position: usize, outcome: &RowOutcome);
    /// Called when a sheet finishes, successfully or not.
    fn sheet_finished(&self, report: &SheetReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl SyncProgress for SilentProgress {
    fn sheet_started(&self, _sheet: &SheetConfig, _rows: usize) {}
    fn row_done(&self, _position: usize, _outcome: &RowOutcome) {}
    fn sheet_finished(&self, _report: &SheetReport) {}
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The collaborators one sync run talks to.
pub struct SyncServices<'a, F, S, T, I> {
    pub fetcher: &'a F,
    pub store: &'a S,
    pub taxonomy: &'a T,
    pub images: &'a I,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Fetch and parse a sheet, checking its required columns.
#[instrument(skip_all, fields(sheet = %sheet.name))]
pub async fn load_sheet<F: SourceFetcher>(sheet: &SheetConfig, fetcher: &F) -> Result<Table> {
    let url = export_url(&sheet.source_url)?;
    let text = fetcher.fetch(&url).await?;
    let table = Table::parse(&text)?;

    let required: &[&str] = match sheet.mode {
        SheetMode::Simple => &[TITLE_COLUMN, CONTENT_COLUMN],
        SheetMode::Developer => &[TITLE_COLUMN],
    };
    let missing = table.missing_columns(required);
    if !missing.is_empty() {
        return Err(SheetSyncError::source_format(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    Ok(table)
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Sync every row of one sheet.
///
/// Never fails: source-level errors land in [`SheetReport::error`] and
/// row-level ones in the `skipped` counter. `cancel` is checked before each
/// row.
#[instrument(skip_all, fields(sheet = %sheet.name))]
pub async fn sync_sheet<F, S, T, I>(
    sheet: &SheetConfig,
    settings: &SyncSettings,
    services: &SyncServices<'_, F, S, T, I>,
    progress: &dyn SyncProgress,
    cancel: &AtomicBool,
) -> SheetReport
where
    F: SourceFetcher,
    S: ContentStore,
    T: Taxonomy,
    I: ImageAttacher,
{
    let mut report = SheetReport::new(sheet);

    let table = match load_sheet(sheet, services.fetcher).await {
        Ok(table) => table,
        Err(e) => {
            if e.is_source_level() {
                warn!(error = %e, "sheet not synced");
            } else {
                error!(error = %e, "sheet configuration is invalid");
            }
            report.error = Some(e.to_string());
            progress.sheet_finished(&report);
            return report;
        }
    };

    report.rows = table.len();
    progress.sheet_started(sheet, table.len());

    let reconciler = Reconciler::new(sheet, settings, services.store);
    for row in table.rows() {
        if cancel.load(Ordering::Relaxed) {
            info!(row = row.position(), "sync cancelled");
            report.cancelled = true;
            break;
        }

        let result = reconciler
            .reconcile(&row, services.taxonomy, services.images)
            .await;
        if let RowOutcome::Skipped(reason) = &result.outcome {
            let error = SheetSyncError::from(reason);
            warn!(row = row.position(), %error, "row skipped");
        }
        report.record(&result);
        progress.row_done(row.position(), &result.outcome);
    }

    info!(
        rows = report.rows,
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        images_set = report.images_set,
        images_failed = report.images_failed,
        "sheet synced"
    );
    progress.sheet_finished(&report);
    report
}

/// Sync every configured sheet, in order, under the batch lock.
///
/// If another run holds the lock this returns immediately with
/// [`BatchSyncLog::lock_busy`] set. Only lock errors are returned as `Err`.
#[instrument(skip_all, fields(sheets = sheets.len()))]
pub async fn run_batch_sync<F, S, T, I, L>(
    sheets: &[SheetConfig],
    settings: &SyncSettings,
    services: &SyncServices<'_, F, S, T, I>,
    lock: &L,
    progress: &dyn SyncProgress,
    cancel: &AtomicBool,
) -> Result<BatchSyncLog>
where
    F: SourceFetcher,
    S: ContentStore,
    T: Taxonomy,
    I: ImageAttacher,
    L: SyncLock,
{
    let started_at = Utc::now();
    let holder = Uuid::now_v7().to_string();

    if !lock
        .try_acquire(SYNC_LOCK_NAME, &holder, settings.lock_ttl)
        .await?
    {
        info!("another sync is running, skipping");
        return Ok(BatchSyncLog {
            started_at,
            finished_at: Utc::now(),
            lock_busy: true,
            reports: Vec::new(),
        });
    }

    let start = Instant::now();
    let mut reports = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        reports.push(sync_sheet(sheet, settings, services, progress, cancel).await);
    }

    if let Err(e) = lock.release(SYNC_LOCK_NAME, &holder).await {
        warn!(error = %e, "failed to release sync lock; it will expire");
    }

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "batch sync done");
    Ok(BatchSyncLog {
        started_at,
        finished_at: Utc::now(),
        lock_busy: false,
        reports,
    })
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// The would-be outcome for a previewed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PreviewAction {
    WouldCreate,
    WouldUpdate,
    Unchanged,
}

impl std::fmt::Display for PreviewAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::WouldCreate => "would create",
            Self::WouldUpdate => "would update",
            Self::Unchanged => "would do nothing (unchanged)",
        })
    }
}

/// Resolved fields shown by a preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewDetails {
    pub action: PreviewAction,
    pub message: String,
    pub title: String,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub content_type: String,
    pub category: String,
    pub tags: Vec<String>,
    pub image_url: String,
    pub content_html: String,
}

/// Either the resolved fields or the reason the row would be skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PreviewBody {
    Details(PreviewDetails),
    Invalid { reason: String },
}

/// Dry-run result for one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub sheet_name: String,
    /// 1-based row actually previewed, after clamping.
    pub row: usize,
    pub total_rows: usize,
    #[serde(flatten)]
    pub body: PreviewBody,
}

/// Describe what syncing row `row` (1-based, clamped) would do, without
/// writing anything.
#[instrument(skip_all, fields(sheet = %sheet.name, row = row))]
pub async fn preview_row<F, S>(
    sheet: &SheetConfig,
    settings: &SyncSettings,
    fetcher: &F,
    store: &S,
    row: usize,
) -> Result<Preview>
where
    F: SourceFetcher,
    S: ContentStore,
{
    let table = load_sheet(sheet, fetcher).await?;
    let total_rows = table.len();
    let position = row.clamp(1, total_rows);
    let data_row = table
        .row(position)
        .ok_or_else(|| SheetSyncError::validation(format!("row {position} out of range")))?;

    let body = match Reconciler::new(sheet, settings, store).plan(&data_row).await {
        Err(reason) => PreviewBody::Invalid {
            reason: reason.to_string(),
        },
        Ok(plan) => {
            let (action, message) = match plan.action {
                Action::Create => (
                    PreviewAction::WouldCreate,
                    "No existing record found with this exact title.".to_string(),
                ),
                Action::Update(id) => (
                    PreviewAction::WouldUpdate,
                    format!("Matched existing record {id} (changes detected)."),
                ),
                Action::Unchanged(id) => (
                    PreviewAction::Unchanged,
                    format!("Matched existing record {id} and its fingerprint is unchanged."),
                ),
            };
            PreviewBody::Details(PreviewDetails {
                action,
                message,
                title: plan.row.title,
                status: plan.status,
                date: plan.date,
                content_type: sheet.target_type.clone(),
                category: plan.row.category,
                tags: plan.row.tags,
                image_url: plan.row.image_raw,
                content_html: plan.row.content_html,
            })
        }
    };

    Ok(Preview {
        sheet_name: sheet.name.clone(),
        row: position,
        total_rows,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFetcher, FakeImages, FakeLock, FakeStore};

    const URL: &str = "https://example.com/posts.csv";

    fn sheet() -> SheetConfig {
        SheetConfig::new("Posts", URL)
    }

    async fn batch(
        sheets: &[SheetConfig],
        fetcher: &FakeFetcher,
        store: &FakeStore,
        lock: &FakeLock,
        cancel: &AtomicBool,
    ) -> BatchSyncLog {
        let images = FakeImages::default();
        let services = SyncServices {
            fetcher,
            store,
            taxonomy: store,
            images: &images,
        };
        run_batch_sync(
            sheets,
            &SyncSettings::default(),
            &services,
            lock,
            &SilentProgress,
            cancel,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let fetcher = FakeFetcher::default().with(
            URL,
            "title,content\nA,First\nB,Second\n,No title\nC,\n",
        );
        let store = FakeStore::default();
        let lock = FakeLock::default();
        let cancel = AtomicBool::new(false);

        let sheets = [sheet()];
        let first = batch(&sheets, &fetcher, &store, &lock, &cancel).await;
        let report = &first.reports[0];
        assert_eq!(report.rows, 4);
        assert_eq!((report.created, report.updated, report.skipped), (2, 0, 2));

        let second = batch(&sheets, &fetcher, &store, &lock, &cancel).await;
        let report = &second.reports[0];
        assert_eq!(
            (report.created, report.updated, report.unchanged, report.skipped),
            (0, 0, 2, 2)
        );
        assert_eq!(store.writes(), 2);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn second_run_against_database_is_a_no_op() {
        use sheetsync_storage::{CATEGORY_TAXONOMY, Storage, TAG_TAXONOMY};

        let path = std::env::temp_dir().join(format!("sheetsync_sync_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&path).await.unwrap();
        let fetcher = FakeFetcher::default().with(
            URL,
            "title,content,category,tags,status\nA,First,News,\"x, y\",publish\nB,Second,,,\n",
        );
        let images = FakeImages::default();
        let services = SyncServices {
            fetcher: &fetcher,
            store: &storage,
            taxonomy: &storage,
            images: &images,
        };
        let sheets = [sheet()];
        let cancel = AtomicBool::new(false);

        let mut reports = Vec::new();
        for _ in 0..2 {
            let log = run_batch_sync(
                &sheets,
                &SyncSettings::default(),
                &services,
                &storage,
                &SilentProgress,
                &cancel,
            )
            .await
            .unwrap();
            assert!(!log.lock_busy);
            reports.push(log.reports[0].clone());
        }
        assert_eq!((reports[0].created, reports[0].updated), (2, 0));
        assert_eq!(
            (reports[1].created, reports[1].updated, reports[1].unchanged),
            (0, 0, 2)
        );

        let a = storage.find_record_by_title("A", "post").await.unwrap().unwrap();
        let record = storage.get_record(a).await.unwrap().unwrap();
        assert_eq!(record.status, PostStatus::Publish);
        assert_eq!(record.content, "<p>First</p>\n");
        assert_eq!(
            storage.record_terms(a, CATEGORY_TAXONOMY).await.unwrap(),
            vec!["News"]
        );
        assert_eq!(
            storage.record_terms(a, TAG_TAXONOMY).await.unwrap(),
            vec!["x", "y"]
        );

        let b = storage.find_record_by_title("B", "post").await.unwrap().unwrap();
        assert!(storage.record_terms(b, TAG_TAXONOMY).await.unwrap().is_empty());
        assert_eq!(
            storage.get_record(b).await.unwrap().unwrap().status,
            PostStatus::Draft
        );
    }

    #[tokio::test]
    async fn source_errors_are_reported_per_sheet() {
        let broken = SheetConfig::new("Broken", "https://example.com/missing.csv");
        let no_content = SheetConfig::new("NoContent", "https://example.com/nc.csv");

        let fetcher = FakeFetcher::default()
            .with(URL, "title,content\nA,Body\n")
            .with("https://example.com/nc.csv", "title,body\nA,Body\n");
        let store = FakeStore::default();

        let log = batch(
            &[broken, sheet(), no_content],
            &fetcher,
            &store,
            &FakeLock::default(),
            &AtomicBool::new(false),
        )
        .await;

        assert_eq!(log.reports.len(), 3);
        assert!(log.reports[0].error.as_deref().unwrap().contains("404"));
        assert_eq!(log.reports[1].created, 1);
        assert!(log.reports[2]
            .error
            .as_deref()
            .unwrap()
            .contains("missing required columns: content"));
        assert_eq!(log.totals().created, 1);
    }

    #[tokio::test]
    async fn busy_lock_skips_the_run() {
        let fetcher = FakeFetcher::default().with(URL, "title,content\nA,Body\n");
        let store = FakeStore::default();
        let lock = FakeLock::held_by("someone else");

        let log = batch(&[sheet()], &fetcher, &store, &lock, &AtomicBool::new(false)).await;
        assert!(log.lock_busy);
        assert!(log.reports.is_empty());
        assert_eq!(store.len(), 0);
        assert!(lock.is_held());
    }

    #[tokio::test]
    async fn cancelled_run_stops_before_rows() {
        let fetcher = FakeFetcher::default().with(URL, "title,content\nA,Body\n");
        let store = FakeStore::default();
        let images = FakeImages::default();
        let services = SyncServices {
            fetcher: &fetcher,
            store: &store,
            taxonomy: &store,
            images: &images,
        };

        let report = sync_sheet(
            &sheet(),
            &SyncSettings::default(),
            &services,
            &SilentProgress,
            &AtomicBool::new(true),
        )
        .await;
        assert!(report.cancelled);
        assert_eq!(report.rows, 1);
        assert_eq!(report.created, 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn preview_reuses_plan_without_writing() {
        let fetcher = FakeFetcher::default().with(
            URL,
            "title,content,tags,status\nA,**Bold**,\"x, y\",publish\n,orphan,,\n",
        );
        let store = FakeStore::default();
        let settings = SyncSettings::default();
        let sheet = sheet();

        let preview = preview_row(&sheet, &settings, &fetcher, &store, 0).await.unwrap();
        assert_eq!(preview.row, 1);
        assert_eq!(preview.total_rows, 2);
        let details = match &preview.body {
            PreviewBody::Details(details) => details.clone(),
            other => panic!("expected details, got {other:?}"),
        };
        assert_eq!(details.action, PreviewAction::WouldCreate);
        assert_eq!(details.status, PostStatus::Publish);
        assert_eq!(details.tags, vec!["x", "y"]);
        assert_eq!(details.content_html, "<p><strong>Bold</strong></p>\n");
        assert_eq!(store.writes(), 0);

        // Clamped to the last row, which has no title.
        let preview = preview_row(&sheet, &settings, &fetcher, &store, 99).await.unwrap();
        assert_eq!(preview.row, 2);
        assert_eq!(
            preview.body,
            PreviewBody::Invalid {
                reason: "row has an empty title".into()
            }
        );

        // After a real sync the same row previews as unchanged.
        let sheets = [sheet.clone()];
        batch(&sheets, &fetcher, &store, &FakeLock::default(), &AtomicBool::new(false)).await;
        let preview = preview_row(&sheet, &settings, &fetcher, &store, 1).await.unwrap();
        let details = match preview.body {
            PreviewBody::Details(details) => details,
            PreviewBody::Invalid { reason } => panic!("expected details, got {reason}"),
        };
        assert_eq!(details.action, PreviewAction::Unchanged);
        assert!(details.message.contains("record 1"));
    }
}
