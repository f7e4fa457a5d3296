//! Row content rendering: constrained Markdown, token templates, and
//! allow-list sanitization.
//!
//! Simple-mode sheets render their `content` cell through
//! [`markdown_to_html`] followed by [`sanitize_html`]. Developer-mode sheets
//! fill a template with [`render_template`], which sanitizes its own output.

mod markdown;
mod sanitize;
mod template;

pub use markdown::markdown_to_html;
pub use sanitize::{sanitize_html, sanitize_text};
pub use template::{RAW_HTML_COLUMN, TemplateCell, render_template};

/// Escape text for inclusion in HTML content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a simple-mode content cell: Markdown, then sanitize.
pub fn render_markdown(text: &str) -> String {
    sanitize_html(&markdown_to_html(text))
}
