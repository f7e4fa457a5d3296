//! Row fingerprints for change detection.
//!
//! A fingerprint is a SHA-256 digest over a fixed sequence of
//! length-prefixed fields, so no two distinct field tuples share an
//! encoding. It is stored as record metadata after every create/update and
//! compared on the next sync to skip unchanged rows.

use sha2::{Digest, Sha256};

/// Record metadata key holding the last written fingerprint.
pub const FINGERPRINT_META_KEY: &str = "_sheetsync_row_hash";

/// The fields that make a row "the same" as last time, in encoding order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FingerprintInput<'a> {
    /// Stable sheet identity.
    pub source: &'a str,
    pub mode: &'a str,
    /// Empty unless the sheet is in developer mode.
    pub template: &'a str,
    pub title: &'a str,
    /// Rendered, sanitized content.
    pub content: &'a str,
    pub category: &'a str,
    /// The `tags` cell as written, before splitting.
    pub tags: &'a str,
    pub image_url: &'a str,
    /// Resolved status.
    pub status: &'a str,
    /// Resolved date (RFC 3339) or empty.
    pub date: &'a str,
}

impl FingerprintInput<'_> {
    fn fields(&self) -> [&str; 10] {
        [
            self.source,
            self.mode,
            self.template,
            self.title,
            self.content,
            self.category,
            self.tags,
            self.image_url,
            self.status,
            self.date,
        ]
    }
}

/// Compute the hex-encoded fingerprint of `input`.
pub fn fingerprint(input: &FingerprintInput<'_>) -> String {
    let mut hasher = Sha256::new();
    for field in input.fields() {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
