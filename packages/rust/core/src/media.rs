//! Featured-image download into the local media directory.

use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use sheetsync_shared::{RecordId, Result, SheetSyncError};
use sheetsync_source::read_capped;

use crate::collab::{ContentStore, ImageAttacher};

/// Record metadata: URL the current image was downloaded from.
pub const IMAGE_URL_META_KEY: &str = "_sheetsync_featured_image_url";
/// Record metadata: where the downloaded image is stored.
pub const IMAGE_PATH_META_KEY: &str = "_sheetsync_featured_image_path";

/// Fallback file name for URLs without a usable last path segment.
const DEFAULT_FILE_NAME: &str = "featured-image.jpg";

/// Maximum image size (20 MB).
const MAX_IMAGE_SIZE: u64 = 20 * 1024 * 1024;

/// Downloads featured images to `<media_dir>/<record id>/<file name>` and
/// records the source URL and stored path on the record.
pub struct MediaAttacher<'a, S> {
    client: Client,
    media_dir: PathBuf,
    store: &'a S,
}

impl<'a, S: ContentStore> MediaAttacher<'a, S> {
    /// `client` should carry the fetch timeout.
    pub fn new(client: Client, media_dir: impl Into<PathBuf>, store: &'a S) -> Self {
        Self {
            client,
            media_dir: media_dir.into(),
            store,
        }
    }

    /// Whether `url` is already the record's image and the file is on disk.
    async fn already_attached(&self, id: RecordId, url: &Url) -> Result<bool> {
        let previous = self.store.get_metadata(id, IMAGE_URL_META_KEY).await?;
        if previous.as_deref() != Some(url.as_str()) {
            return Ok(false);
        }
        let path = self.store.get_metadata(id, IMAGE_PATH_META_KEY).await?;
        Ok(path.is_some_and(|p| Path::new(&p).is_file()))
    }

    async fn download(&self, url: &Url) -> Result<(Vec<u8>, Option<String>)> {
        let err = |msg: String| SheetSyncError::ImageAttach(format!("{url}: {msg}"));

        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                err("timed out".into())
            } else {
                err(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(err(format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());
        if let Some(ct) = &content_type {
            if !ct.starts_with("image/") {
                return Err(err(format!("not an image ({ct})")));
            }
        }

        if let Some(len) = response.content_length() {
            if len > MAX_IMAGE_SIZE {
                return Err(err(format!("image too large ({len} bytes)")));
            }
        }

        let bytes = read_capped(response, MAX_IMAGE_SIZE)
            .await
            .map_err(|e| err(e.to_string()))?;
        if bytes.is_empty() {
            return Err(err("empty body".into()));
        }

        Ok((bytes, content_type))
    }
}

impl<S: ContentStore> ImageAttacher for MediaAttacher<'_, S> {
    #[instrument(skip(self), fields(record = %id, url = %image_url))]
    async fn attach_featured_image(&self, id: RecordId, image_url: &Url) -> Result<()> {
        if self.already_attached(id, image_url).await? {
            debug!("featured image unchanged, skipping download");
            return Ok(());
        }

        let (bytes, content_type) = self.download(image_url).await?;

        let dir = self.media_dir.join(id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SheetSyncError::io(&dir, e))?;
        let path = dir.join(file_name(image_url, content_type.as_deref()));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| SheetSyncError::io(&path, e))?;

        let stored = path.to_string_lossy();
        self.store
            .set_metadata(id, IMAGE_PATH_META_KEY, &stored)
            .await?;
        self.store
            .set_metadata(id, IMAGE_URL_META_KEY, image_url.as_str())
            .await?;

        debug!(path = %stored, bytes = bytes.len(), "featured image stored");
        Ok(())
    }
}

/// Safe local file name from the URL's last path segment.
fn file_name(url: &Url, content_type: Option<&str>) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or_default();

    let name: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_matches('.');

    if name.is_empty() {
        return DEFAULT_FILE_NAME.to_string();
    }
    if name.contains('.') {
        return name.to_string();
    }

    let ext = match content_type.and_then(|ct| ct.strip_prefix("image/")) {
        Some("jpeg") | None => "jpg",
        Some("svg+xml") => "svg",
        Some(other) => other,
    };
    format!("{name}.{ext}")
}
