//! HTML-to-text conversion for fetched pages.
//!
//! Strips page chrome with `scraper`, converts the remaining HTML with
//! `htmd`, then runs cleanup passes so each objective-like statement ends
//! up on its own line.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use objectivedb_shared::{ObjectiveDbError, Result};

/// Tags whose content never carries objectives.
const SKIP_TAGS: [&str; 9] = [
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
];

/// Convert an HTML page to cleaned, line-oriented text.
pub fn html_to_text(html: &str) -> Result<String> {
    let content_html = extract_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(&content_html)
        .map_err(|e| ObjectiveDbError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw.len(), "htmd conversion complete");

    Ok(run_pipeline(&raw))
}

/// Extract the main content HTML, falling back to `<body>`.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    let selectors = ["main", "[role=\"main\"]", "article", "#content", ".content"];

    for sel_str in &selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    html.to_string()
}

// ---------------------------------------------------------------------------
// Cleanup passes
// ---------------------------------------------------------------------------

fn run_pipeline(md: &str) -> String {
    let mut result = unwrap_links(md);
    result = strip_emphasis(&result);
    result = strip_leftover_html(&result);
    result = normalize_whitespace(&result);
    result
}

/// `[text](url)` → `text`; images are dropped.
fn unwrap_links(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

    let without_images = IMAGE_RE.replace_all(md, "");
    LINK_RE.replace_all(&without_images, "$1").to_string()
}

/// Drop `**bold**` / `__bold__` markers, keeping the text.
fn strip_emphasis(md: &str) -> String {
    static EMPHASIS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\*\*|__)([^*_\n]+)(\*\*|__)").expect("valid regex"));

    EMPHASIS_RE.replace_all(md, "$2").to_string()
}

/// Remove stray HTML tags that survived the conversion, preserving inner text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*(?:\s[^>]*)?/?>").expect("valid regex"));

    HTML_TAG_RE.replace_all(md, "").to_string()
}

/// Trim trailing spaces, collapse list-marker padding and runs of blank lines.
fn normalize_whitespace(md: &str) -> String {
    static MARKER_PAD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\s*(?:[-*+]|\d+[.)]))\s{2,}").expect("valid regex"));
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let lines: Vec<String> = md
        .lines()
        .map(|line| MARKER_PAD_RE.replace(line.trim_end(), "$1 ").to_string())
        .collect();

    let joined = lines.join("\n");
    let collapsed = MULTI_BLANK_RE.replace_all(&joined, "\n\n");
    let mut out = collapsed.trim().to_string();
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_items_become_lines() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a> <a href="/about">About</a></nav>
            <main>
              <h1>Praxis 5001 Framework</h1>
              <ol>
                <li>Demonstrate understanding of <strong>phonological awareness</strong></li>
                <li>Apply <a href="/x">number sense</a> to multi-digit problems</li>
              </ol>
            </main>
            <footer>Copyright 2024 ETS</footer>
        </body></html>"#;

        let text = html_to_text(html).unwrap();
        assert!(!text.contains("Home"));
        assert!(!text.contains("Copyright"));
        assert!(text.contains("Praxis 5001 Framework"));
        assert!(
            text.lines()
                .any(|l| l.trim() == "1. Demonstrate understanding of phonological awareness")
        );
        assert!(
            text.lines()
                .any(|l| l.trim() == "2. Apply number sense to multi-digit problems")
        );
    }

    #[test]
    fn falls_back_to_body() {
        let text = html_to_text("<html><body><p>Praxis 5161: Mathematics</p></body></html>").unwrap();
        assert_eq!(text, "Praxis 5161: Mathematics\n");
    }

    #[test]
    fn cleanup_passes() {
        assert_eq!(unwrap_links("See [the guide](https://x.gov/g) ![logo](l.png)"), "See the guide ");
        assert_eq!(strip_emphasis("**Bold** and __strong__"), "Bold and strong");
        assert_eq!(strip_leftover_html("<div class=\"a\">text</div>"), "text");
        assert_eq!(normalize_whitespace("1.  Item\n\n\n\n-   Other  \n"), "1. Item\n\n- Other\n");
    }
}
