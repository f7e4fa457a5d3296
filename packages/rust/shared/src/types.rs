//! Core domain types for sheetsync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Template used when a sheet has none configured.
pub const DEFAULT_TEMPLATE: &str = "<h2>{{title}}</h2>\n<p>{{content}}</p>";

/// Content type used when a sheet has none configured.
pub const DEFAULT_TARGET_TYPE: &str = "post";

// ---------------------------------------------------------------------------
// SheetId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one configured sheet (time-sortable).
///
/// Generated once when the sheet is first configured and never changed, so
/// fingerprints stay stable when the sheet is renamed or reordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub Uuid);

impl SheetId {
    /// Generate a new sheet identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Whether this is the all-zero placeholder left by a missing `id` key.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for SheetId {
    fn default() -> Self {
        Self(Uuid::nil())
    }
}

impl std::fmt::Display for SheetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SheetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// SheetMode
// ---------------------------------------------------------------------------

/// How row cells are turned into record content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SheetMode {
    /// The `content` cell is rendered as constrained Markdown.
    #[default]
    Simple,
    /// The sheet template is filled with `{{column}}` tokens.
    Developer,
}

impl SheetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Developer => "developer",
        }
    }
}

impl From<String> for SheetMode {
    /// Anything other than `developer` normalizes to `simple`.
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("developer") {
            Self::Developer
        } else {
            Self::Simple
        }
    }
}

impl From<SheetMode> for String {
    fn from(mode: SheetMode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for SheetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PostStatus
// ---------------------------------------------------------------------------

/// Publication state of a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Publish,
    Private,
    Pending,
    /// Scheduled for publication at the record's date.
    Future,
}

impl PostStatus {
    pub const ALL: [PostStatus; 5] = [
        Self::Draft,
        Self::Publish,
        Self::Private,
        Self::Pending,
        Self::Future,
    ];

    /// Parse a status cell. Case-insensitive, trimmed; `scheduled` is an
    /// alias for `future`. Unknown or empty values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "publish" => Some(Self::Publish),
            "private" => Some(Self::Private),
            "pending" => Some(Self::Pending),
            "future" | "scheduled" => Some(Self::Future),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Publish => "publish",
            Self::Private => "private",
            Self::Pending => "pending",
            Self::Future => "future",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SheetConfig
// ---------------------------------------------------------------------------

/// One configured data source and its rendering rule (`[[sheets]]` entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetConfig {
    /// Stable identity, generated once.
    #[serde(default, skip_serializing_if = "SheetId::is_nil")]
    pub id: SheetId,
    /// Display label.
    #[serde(default)]
    pub name: String,
    /// Link to the spreadsheet as pasted by the user.
    #[serde(default)]
    pub source_url: String,
    /// Rendering mode.
    #[serde(default)]
    pub mode: SheetMode,
    /// HTML template with `{{token}}` placeholders (developer mode only).
    #[serde(default = "default_template")]
    pub template: String,
    /// Kind of content record to create.
    #[serde(default = "default_target_type")]
    pub target_type: String,
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.into()
}
fn default_target_type() -> String {
    DEFAULT_TARGET_TYPE.into()
}

impl SheetConfig {
    /// A fresh sheet with a new identity and default rendering settings.
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: SheetId::new(),
            name: name.into(),
            source_url: source_url.into(),
            mode: SheetMode::Simple,
            template: default_template(),
            target_type: default_target_type(),
        }
    }

    /// Fill in defaults for blank fields. `position` is the 1-based slot
    /// used for the fallback name. Returns `true` if anything changed.
    pub fn normalize(&mut self, position: usize) -> bool {
        let mut changed = false;

        if self.id.is_nil() {
            self.id = SheetId::new();
            changed = true;
        }
        let name = self.name.trim();
        if name.is_empty() {
            self.name = format!("Sheet {position}");
            changed = true;
        } else if name.len() != self.name.len() {
            self.name = name.to_string();
            changed = true;
        }
        let url = self.source_url.trim();
        if url.len() != self.source_url.len() {
            self.source_url = url.to_string();
            changed = true;
        }
        if self.template.trim().is_empty() {
            self.template = default_template();
            changed = true;
        }
        let target = self.target_type.trim().to_ascii_lowercase();
        if target.is_empty() {
            self.target_type = default_target_type();
            changed = true;
        } else if target != self.target_type {
            self.target_type = target;
            changed = true;
        }

        changed
    }

    /// Template that participates in rendering and fingerprinting: empty
    /// unless the sheet is in developer mode.
    pub fn effective_template(&self) -> &str {
        match self.mode {
            SheetMode::Developer => &self.template,
            SheetMode::Simple => "",
        }
    }

    /// Whether `key` names this sheet (by id or case-insensitive name).
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        self.id.to_string() == key || self.name.eq_ignore_ascii_case(key)
    }
}

// ---------------------------------------------------------------------------
// Content records
// ---------------------------------------------------------------------------

/// Store-assigned identifier of a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of a taxonomy term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub i64);

/// Fields written on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWrite {
    pub title: String,
    pub content_html: String,
    pub status: PostStatus,
    pub content_type: String,
    /// Publication date; `None` leaves the stored date untouched on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

/// The parts of a stored record the reconciler needs to read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub status: PostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_id_roundtrip() {
        let id = SheetId::new();
        let parsed: SheetId = id.to_string().parse().expect("parse SheetId");
        assert_eq!(id, parsed);
        assert!(!id.is_nil());
        assert!(SheetId::default().is_nil());
    }

    #[test]
    fn unknown_mode_normalizes_to_simple() {
        assert_eq!(SheetMode::from("developer".to_string()), SheetMode::Developer);
        assert_eq!(SheetMode::from(" Developer ".to_string()), SheetMode::Developer);
        assert_eq!(SheetMode::from("fancy".to_string()), SheetMode::Simple);
        assert_eq!(SheetMode::from(String::new()), SheetMode::Simple);
    }

    #[test]
    fn status_parsing() {
        assert_eq!(PostStatus::parse(" Publish "), Some(PostStatus::Publish));
        assert_eq!(PostStatus::parse("scheduled"), Some(PostStatus::Future));
        assert_eq!(PostStatus::parse("FUTURE"), Some(PostStatus::Future));
        assert_eq!(PostStatus::parse(""), None);
        assert_eq!(PostStatus::parse("trash"), None);
        for status in PostStatus::ALL {
            assert_eq!(PostStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn sheet_config_defaults_from_sparse_json() {
        let sheet: SheetConfig =
            serde_json::from_str(r#"{"name":"Posts","mode":"weird"}"#).expect("deserialize");
        assert_eq!(sheet.mode, SheetMode::Simple);
        assert_eq!(sheet.template, DEFAULT_TEMPLATE);
        assert_eq!(sheet.target_type, "post");
        assert!(sheet.id.is_nil());
    }

    #[test]
    fn normalize_fills_blanks() {
        let mut sheet = SheetConfig {
            id: SheetId::default(),
            name: "  ".into(),
            source_url: " https://example.com ".into(),
            mode: SheetMode::Developer,
            template: String::new(),
            target_type: " Page ".into(),
        };
        assert!(sheet.normalize(3));
        assert!(!sheet.id.is_nil());
        assert_eq!(sheet.name, "Sheet 3");
        assert_eq!(sheet.source_url, "https://example.com");
        assert_eq!(sheet.template, DEFAULT_TEMPLATE);
        assert_eq!(sheet.target_type, "page");
        assert!(!sheet.normalize(3));
    }

    #[test]
    fn effective_template_only_in_developer_mode() {
        let mut sheet = SheetConfig::new("a", "b");
        assert_eq!(sheet.effective_template(), "");
        sheet.mode = SheetMode::Developer;
        assert_eq!(sheet.effective_template(), DEFAULT_TEMPLATE);
    }

    #[test]
    fn sheet_matching_by_name_or_id() {
        let sheet = SheetConfig::new("Products", "https://example.com");
        assert!(sheet.matches("products"));
        assert!(sheet.matches(&sheet.id.to_string()));
        assert!(!sheet.matches("orders"));
    }
}
