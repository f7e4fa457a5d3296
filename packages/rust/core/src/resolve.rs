//! Turning one data row into the fields a record is built from.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use url::Url;

use sheetsync_render::{TemplateCell, render_markdown, render_template, sanitize_text};
use sheetsync_shared::{PostStatus, SheetConfig, SheetMode, SheetSyncError};
use sheetsync_source::Row;

/// Column holding the record title.
pub const TITLE_COLUMN: &str = "title";
/// Column holding simple-mode Markdown content.
pub const CONTENT_COLUMN: &str = "content";
pub const CATEGORY_COLUMN: &str = "category";
pub const TAGS_COLUMN: &str = "tags";
pub const IMAGE_COLUMN: &str = "featured_image";
pub const STATUS_COLUMN: &str = "status";
/// Date columns, in lookup order.
pub const DATE_COLUMNS: [&str; 2] = ["post_date", "date"];

/// Why a row produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyTitle,
    EmptyContent,
    /// Reading the existing record failed.
    Lookup(String),
    /// The store refused to create the record.
    CreateRejected(String),
    /// The store refused to update the record.
    UpdateRejected(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => f.write_str("row has an empty title"),
            Self::EmptyContent => f.write_str("row has empty content"),
            Self::Lookup(e) => write!(f, "existing record lookup failed: {e}"),
            Self::CreateRejected(e) => write!(f, "store rejected create: {e}"),
            Self::UpdateRejected(e) => write!(f, "store rejected update: {e}"),
        }
    }
}

impl From<&SkipReason> for SheetSyncError {
    fn from(reason: &SkipReason) -> Self {
        match reason {
            SkipReason::EmptyTitle | SkipReason::EmptyContent => {
                SheetSyncError::row_invalid(reason.to_string())
            }
            SkipReason::Lookup(e) => SheetSyncError::Storage(e.clone()),
            SkipReason::CreateRejected(e) | SkipReason::UpdateRejected(e) => {
                SheetSyncError::StoreWrite(e.clone())
            }
        }
    }
}

/// Row fields after extraction and rendering, before status/date
/// resolution against any existing record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    pub title: String,
    pub content_html: String,
    /// Empty when the row has no category.
    pub category: String,
    /// The `tags` cell as written (trimmed).
    pub tags_raw: String,
    pub tags: Vec<String>,
    /// The `featured_image` cell as written (trimmed).
    pub image_raw: String,
    /// `image_raw` if it is a usable http(s) URL.
    pub image_url: Option<Url>,
    /// Valid status from the row, if any.
    pub row_status: Option<PostStatus>,
    /// Parsed date from the row, if any.
    pub row_date: Option<DateTime<Utc>>,
}

/// Extract and render a row for `sheet`.
pub fn resolve_row(sheet: &SheetConfig, row: &Row<'_>) -> Result<ResolvedRow, SkipReason> {
    let title = sanitize_text(row.raw(TITLE_COLUMN));
    if title.is_empty() {
        return Err(SkipReason::EmptyTitle);
    }

    let content_html = match sheet.mode {
        SheetMode::Developer => {
            let cells: Vec<TemplateCell<'_>> = row
                .table()
                .columns()
                .into_iter()
                .map(|column| TemplateCell {
                    name: column.name,
                    value: row.value_at(column.index),
                })
                .collect();
            render_template(&sheet.template, &cells)
        }
        SheetMode::Simple => {
            let content = row.raw(CONTENT_COLUMN);
            if content.trim().is_empty() {
                return Err(SkipReason::EmptyContent);
            }
            render_markdown(content)
        }
    };

    let tags_raw = row.cell(TAGS_COLUMN).to_string();
    let image_raw = row.cell(IMAGE_COLUMN).to_string();

    Ok(ResolvedRow {
        title,
        content_html,
        category: sanitize_text(row.raw(CATEGORY_COLUMN)),
        tags: parse_tags(&tags_raw),
        image_url: parse_image_url(&image_raw),
        image_raw,
        tags_raw,
        row_status: PostStatus::parse(row.cell(STATUS_COLUMN)),
        row_date: DATE_COLUMNS
            .iter()
            .map(|column| row.cell(column))
            .find(|value| !value.is_empty())
            .and_then(parse_date),
    })
}

/// Split a tags cell on commas; parts are trimmed, empties dropped,
/// order and duplicates kept.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn parse_image_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Some(url),
        _ => None,
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"];

/// Permissive date parser. Values without an offset are read as UTC;
/// bare dates mean midnight. Anything unrecognized is `None`.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Some(dt.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sheetsync_source::Table;

    fn sheet(mode: SheetMode) -> SheetConfig {
        let mut sheet = SheetConfig::new("Test", "https://example.com/sheet.csv");
        sheet.mode = mode;
        sheet
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        assert_eq!(parse_tags("a, b ,,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_tags("x,x"), vec!["x", "x"]);
        assert!(parse_tags(" , ").is_empty());
    }

    #[test]
    fn dates_are_parsed_permissively() {
        let expected = Utc.with_ymd_and_hms(2030, 5, 6, 7, 8, 0).unwrap();
        assert_eq!(parse_date("2030-05-06 07:08"), Some(expected));
        assert_eq!(parse_date("2030-05-06T07:08:00Z"), Some(expected));
        assert_eq!(parse_date("2030-05-06T09:08:00+02:00"), Some(expected));
        assert_eq!(parse_date("05/06/2030 07:08"), Some(expected));
        assert_eq!(
            parse_date("2030-05-06"),
            Some(Utc.with_ymd_and_hms(2030, 5, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("next tuesday"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn simple_row_resolves() {
        let table = Table::parse(
            "Title,Content,Category,Tags,Featured_Image,Status,Post_Date\n\
             \" Hello <b>World</b> \",\"# H\nBody\",News,\"a, b\",https://example.com/i.png,Publish,2030-01-01\n",
        )
        .unwrap();
        let row = table.row(1).unwrap();
        let resolved = resolve_row(&sheet(SheetMode::Simple), &row).unwrap();

        assert_eq!(resolved.title, "Hello World");
        assert_eq!(resolved.content_html, "<h1>H</h1>\n<p>Body</p>\n");
        assert_eq!(resolved.category, "News");
        assert_eq!(resolved.tags_raw, "a, b");
        assert_eq!(resolved.tags, vec!["a", "b"]);
        assert_eq!(resolved.image_url.unwrap().as_str(), "https://example.com/i.png");
        assert_eq!(resolved.row_status, Some(PostStatus::Publish));
        assert!(resolved.row_date.is_some());
    }

    #[test]
    fn empty_title_and_content_are_skipped() {
        let table = Table::parse("title,content\n  ,body\nT,  \n").unwrap();
        let simple = sheet(SheetMode::Simple);
        assert_eq!(
            resolve_row(&simple, &table.row(1).unwrap()),
            Err(SkipReason::EmptyTitle)
        );
        assert_eq!(
            resolve_row(&simple, &table.row(2).unwrap()),
            Err(SkipReason::EmptyContent)
        );

        // Developer mode does not need a content cell.
        let developer = sheet(SheetMode::Developer);
        assert_eq!(
            resolve_row(&developer, &table.row(1).unwrap()),
            Err(SkipReason::EmptyTitle)
        );
        assert!(resolve_row(&developer, &table.row(2).unwrap()).is_ok());
    }

    #[test]
    fn developer_template_escapes_cells() {
        let table = Table::parse("title,content\nHi,<script>bad()</script>\n").unwrap();
        let mut developer = sheet(SheetMode::Developer);
        developer.template = "<h2>{{title}}</h2><p>{{content}}</p>".into();

        let resolved = resolve_row(&developer, &table.row(1).unwrap()).unwrap();
        assert_eq!(
            resolved.content_html,
            "<h2>Hi</h2><p>&lt;script&gt;bad()&lt;/script&gt;</p>"
        );
    }

    #[test]
    fn invalid_optional_fields_are_absent() {
        let table =
            Table::parse("title,content,featured_image,status,date\nT,B,not a url,trash,someday\n")
                .unwrap();
        let resolved = resolve_row(&sheet(SheetMode::Simple), &table.row(1).unwrap()).unwrap();
        assert!(resolved.image_url.is_none());
        assert_eq!(resolved.image_raw, "not a url");
        assert!(resolved.row_status.is_none());
        assert!(resolved.row_date.is_none());
        assert_eq!(resolved.category, "");
    }

    #[test]
    fn skip_reasons_map_to_row_scoped_errors() {
        let err = SheetSyncError::from(&SkipReason::EmptyTitle);
        assert!(matches!(err, SheetSyncError::RowInvalid { .. }));
        assert!(err.to_string().contains("empty title"));

        let err = SheetSyncError::from(&SkipReason::UpdateRejected("locked".into()));
        assert!(matches!(err, SheetSyncError::StoreWrite(ref m) if m == "locked"));

        let err = SheetSyncError::from(&SkipReason::Lookup("gone".into()));
        assert!(!err.is_source_level());
    }
}
