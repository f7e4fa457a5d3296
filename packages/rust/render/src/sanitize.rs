//! Allow-list HTML sanitizer and plain-text cleanup.
//!
//! Content is parsed as an HTML fragment and re-serialized keeping only
//! allowed elements and attributes. Disallowed elements are unwrapped
//! (their text survives, escaped) except for a small set whose contents
//! are dropped entirely. URL attributes must use a safe scheme.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use tracing::trace;
use url::Url;

/// Elements that survive sanitization.
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "caption", "cite", "code", "del", "div", "em",
    "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "ins", "li",
    "mark", "ol", "p", "pre", "q", "s", "small", "span", "strong", "sub", "sup", "table",
    "tbody", "td", "tfoot", "th", "thead", "tr", "u", "ul",
];

/// Elements removed together with everything inside them.
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "svg", "math",
    "form", "textarea", "select", "button",
];

/// Elements written without a closing tag.
const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Attributes allowed on every element.
const GLOBAL_ATTRS: &[&str] = &["class", "id", "title", "lang", "dir"];

/// Attributes allowed on specific elements.
fn element_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "rel", "target", "name"],
        "img" => &["src", "alt", "width", "height", "loading"],
        "td" | "th" => &["colspan", "rowspan", "scope"],
        "ol" => &["start", "reversed"],
        "blockquote" | "q" | "del" | "ins" => &["cite"],
        _ => &[],
    }
}

/// Attributes whose value is a URL.
const URL_ATTRS: &[&str] = &["href", "src", "cite"];

/// URL schemes allowed in URL attributes.
const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Sanitize an HTML fragment against the allow-list.
pub fn sanitize_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    write_children(fragment.root_element(), &mut out);
    out
}

fn write_children(parent: ElementRef<'_>, out: &mut String) {
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => push_text(out, text),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    write_element(element, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let tag = element.value().name();

    if DROPPED_TAGS.contains(&tag) {
        trace!(tag, "dropping element with its contents");
        return;
    }
    if !ALLOWED_TAGS.contains(&tag) {
        write_children(element, out);
        return;
    }

    // Attribute storage order is not stable; sort so output is deterministic.
    let mut attrs: Vec<(String, &str)> = element
        .value()
        .attrs()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));

    out.push('<');
    out.push_str(tag);
    for (name, value) in attrs {
        if !GLOBAL_ATTRS.contains(&name.as_str()) && !element_attrs(tag).contains(&name.as_str())
        {
            continue;
        }
        if URL_ATTRS.contains(&name.as_str()) && !is_safe_url(value) {
            continue;
        }
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        push_attr(out, value);
        out.push('"');
    }
    out.push('>');

    if VOID_TAGS.contains(&tag) {
        return;
    }

    write_children(element, out);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Relative URLs and fragments are fine; absolute ones need a safe scheme.
fn is_safe_url(value: &str) -> bool {
    let value = value.trim();
    match Url::parse(value) {
        Ok(url) => SAFE_SCHEMES.contains(&url.scheme()),
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}

fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn push_attr(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Reduce a cell to a single line of plain text: tags stripped, runs of
/// whitespace (including line breaks) collapsed, ends trimmed.
pub fn sanitize_text(value: &str) -> String {
    let stripped = TAG_RE.replace_all(value, "");
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}
