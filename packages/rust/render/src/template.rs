//! `{{column}}` token substitution for developer-mode sheets.

use crate::{escape_html, sanitize_html};

/// Pseudo-column whose value is inserted as raw HTML.
pub const RAW_HTML_COLUMN: &str = "content_html";

/// A named cell value available to a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateCell<'a> {
    /// Column name as written in the header.
    pub name: &'a str,
    /// Untrimmed cell value.
    pub value: &'a str,
}

/// Fill `template` with row values and sanitize the result.
///
/// Each column's token is replaced by the HTML-escaped value. The token is
/// matched literally as the header spells it, and also in the lower-cased
/// form used for header lookup. The `content_html` column is inserted
/// unescaped; the final sanitize pass bounds what it can inject. Tokens
/// with no matching column are left in place.
pub fn render_template(template: &str, cells: &[TemplateCell<'_>]) -> String {
    let mut out = template.to_string();

    for cell in cells {
        let raw = cell.name.trim().eq_ignore_ascii_case(RAW_HTML_COLUMN);
        let value = if raw {
            cell.value.to_string()
        } else {
            escape_html(cell.value)
        };

        for token in token_spellings(cell.name) {
            out = out.replace(&token, &value);
        }
    }

    sanitize_html(&out)
}

fn token_spellings(name: &str) -> Vec<String> {
    let written = name.trim();
    let lower = written.to_lowercase();
    let mut tokens = vec![format!("{{{{{written}}}}}")];
    if lower != written {
        tokens.push(format!("{{{{{lower}}}}}"));
    }
    tokens
}
