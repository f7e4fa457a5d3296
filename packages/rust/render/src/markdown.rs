//! Constrained Markdown → HTML.
//!
//! Line-oriented: `#`..`###` headings, `-` bullet lists, and one paragraph
//! per remaining non-blank line. Lines are never merged. After the block
//! pass, `**bold**` and then `*italic*` are applied across the whole
//! output (non-greedy, may span lines). Text is escaped before the inline
//! pass, so the markers themselves are never escaped.

use std::sync::LazyLock;

use regex::Regex;

use crate::escape_html;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,3})\s+(.*)$").expect("heading regex"));

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s+(.*)$").expect("bullet regex"));

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*\*(.+?)\*\*").expect("bold regex"));

static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*(.+?)\*").expect("italic regex"));

/// Render a content cell to (unsanitized) HTML.
pub fn markdown_to_html(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut html = String::with_capacity(text.len() * 2);
    let mut in_list = false;

    for line in text.split('\n') {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            close_list(&mut html, &mut in_list);
            html.push('\n');
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(trimmed) {
            close_list(&mut html, &mut in_list);
            let level = caps[1].len();
            html.push_str(&format!(
                "<h{level}>{}</h{level}>\n",
                escape_html(&caps[2])
            ));
            continue;
        }

        if let Some(caps) = BULLET_RE.captures(trimmed) {
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            html.push_str(&format!("<li>{}</li>\n", escape_html(&caps[1])));
            continue;
        }

        close_list(&mut html, &mut in_list);
        html.push_str(&format!("<p>{}</p>\n", escape_html(trimmed)));
    }

    close_list(&mut html, &mut in_list);

    // Bold first so `**` is not read as two italic markers.
    let html = BOLD_RE.replace_all(&html, "<strong>$1</strong>");
    ITALIC_RE.replace_all(&html, "<em>$1</em>").into_owned()
}

fn close_list(html: &mut String, in_list: &mut bool) {
    if *in_list {
        html.push_str("</ul>\n");
        *in_list = false;
    }
}
