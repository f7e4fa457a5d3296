//! Spreadsheet source resolution, fetching, and CSV parsing.
//!
//! Users paste an ordinary share link for a spreadsheet. Before syncing we
//! turn that link into a direct CSV export URL, download it with a bounded
//! timeout, and parse it into a header-indexed [`Table`].

mod table;

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, Response};
use sheetsync_shared::{Result, SheetSyncError};
use tracing::{debug, instrument};
use url::Url;

pub use table::{Column, Row, Table, header_map, parse_rows};

/// Maximum number of redirects to follow when fetching a sheet.
const MAX_REDIRECTS: usize = 5;

/// Maximum response size we consider valid (20 MB).
const MAX_RESPONSE_SIZE: u64 = 20 * 1024 * 1024;

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("sheetsync/", env!("CARGO_PKG_VERSION"));

/// Spreadsheet id embedded in a share link (`/d/<id>/...`).
static SHEET_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/d/([a-zA-Z0-9_-]+)").expect("sheet id regex"));

/// Tab id in a query string or fragment (`gid=123`).
static GID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&#]gid=(\d+)").expect("gid regex"));

// ---------------------------------------------------------------------------
// Export URL
// ---------------------------------------------------------------------------

/// Convert a user-supplied sheet link into the canonical CSV export URL.
///
/// Links that already point at CSV output (`.csv` path, `format=csv` or
/// `output=csv` query) are used as-is. Otherwise the spreadsheet id is
/// extracted from the `/d/<id>` path segment and an export URL is built,
/// keeping the selected tab (`gid`) if the link names one.
pub fn export_url(link: &str) -> Result<Url> {
    let link = link.trim();
    if link.is_empty() {
        return Err(SheetSyncError::validation("sheet link is empty"));
    }

    if let Ok(url) = Url::parse(link) {
        let is_http = matches!(url.scheme(), "http" | "https");
        let already_csv = url.path().ends_with(".csv")
            || url
                .query_pairs()
                .any(|(k, v)| (k == "format" || k == "output") && v == "csv");
        if is_http && already_csv {
            return Ok(url);
        }
    }

    let caps = SHEET_ID_RE.captures(link).ok_or_else(|| {
        SheetSyncError::validation(format!("no spreadsheet id found in link: {link}"))
    })?;
    let sheet_id = &caps[1];

    let mut export = format!("https://docs.google.com/spreadsheets/d/{sheet_id}/export?format=csv");
    if let Some(gid) = GID_RE.captures(link) {
        export.push_str("&gid=");
        export.push_str(&gid[1]);
    }

    Url::parse(&export)
        .map_err(|e| SheetSyncError::validation(format!("invalid export URL {export}: {e}")))
}

// ---------------------------------------------------------------------------
// Bounded body reads
// ---------------------------------------------------------------------------

/// Why [`read_capped`] gave up on a response body.
#[derive(Debug)]
pub enum BodyError {
    /// The body grew past the cap.
    TooLarge { max: u64 },
    /// The connection failed or timed out mid-body.
    Read(reqwest::Error),
}

impl std::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge { max } => write!(f, "response too large (max {max} bytes)"),
            Self::Read(e) if e.is_timeout() => f.write_str("timed out reading body"),
            Self::Read(e) => write!(f, "failed to read body: {e}"),
        }
    }
}

/// Read a response body chunk by chunk, stopping once it exceeds `max`
/// bytes. Chunked responses carry no length header, so the count is kept
/// while reading.
pub async fn read_capped(
    mut response: Response,
    max: u64,
) -> std::result::Result<Vec<u8>, BodyError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(BodyError::Read)? {
        if (body.len() + chunk.len()) as u64 > max {
            return Err(BodyError::TooLarge { max });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// ---------------------------------------------------------------------------
// HTTP fetcher
// ---------------------------------------------------------------------------

/// Downloads sheet payloads over HTTP with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SheetSyncError::SourceFetch(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, timeout })
    }

    /// The underlying client, shared with other downloaders.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch the raw text body at `url`.
    ///
    /// Network failures, timeouts, non-2xx responses and blank bodies all
    /// map to [`SheetSyncError::SourceFetch`].
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                SheetSyncError::SourceFetch(format!(
                    "{url}: timed out after {}s",
                    self.timeout.as_secs()
                ))
            } else {
                SheetSyncError::SourceFetch(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetSyncError::SourceFetch(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(SheetSyncError::SourceFetch(format!(
                    "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        let bytes = read_capped(response, MAX_RESPONSE_SIZE)
            .await
            .map_err(|e| SheetSyncError::SourceFetch(format!("{url}: {e}")))?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        if body.trim().is_empty() {
            return Err(SheetSyncError::SourceFetch(format!(
                "{url}: sheet returned no data"
            )));
        }

        debug!(bytes = body.len(), "sheet downloaded");
        Ok(body)
    }
}
