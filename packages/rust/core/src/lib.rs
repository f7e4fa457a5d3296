//! Sync reconciliation for sheetsync.
//!
//! This crate ties the source reader, renderers and content store together:
//! rows are resolved ([`resolve`]), fingerprinted ([`fingerprint`]) and
//! reconciled against existing records ([`engine`]); [`sync`] runs that over
//! whole sheets under a batch lock and provides dry-run previews.

pub mod collab;
pub mod engine;
pub mod fingerprint;
pub mod media;
pub mod resolve;
pub mod sync;

#[cfg(test)]
mod testing;

pub use collab::{ContentStore, ImageAttacher, SourceFetcher, SyncLock, Taxonomy};
pub use engine::{Action, ImageOutcome, Reconciler, RowOutcome, RowPlan, RowResult};
pub use fingerprint::{FINGERPRINT_META_KEY, FingerprintInput, fingerprint};
pub use media::MediaAttacher;
pub use resolve::{ResolvedRow, SkipReason, parse_tags, resolve_row};
pub use sync::{
    BatchSyncLog, Preview, PreviewAction, PreviewBody, PreviewDetails, SYNC_LOCK_NAME,
    SheetReport, SilentProgress, SyncProgress, SyncServices, load_sheet, preview_row,
    run_batch_sync, sync_sheet,
};
