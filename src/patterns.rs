//! Pure structural-detection functions.
//!
//! Each scan is an order-independent pure function over the text, kept
//! behind a stable interface so any one of them can be swapped for a real
//! parser without touching the classifier's control flow.

use regex::Regex;
use std::sync::OnceLock;

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid detector pattern"))
}

/// HTML tables or markdown pipe rows
pub fn detect_tables(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?im)<table\b|^\s*\|.+\|\s*$").is_match(text)
}

/// HTML or markdown list items
pub fn detect_lists(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?im)<[uo]l\b|<li\b|^\s*(?:[-*+]|\d+\.)\s+\S").is_match(text)
}

/// Code blocks: pre/code tags or fenced blocks
pub fn detect_code(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?i)<pre\b|<code\b|```").is_match(text)
}

/// Embedded images: img tags or markdown image syntax
pub fn detect_images(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?i)<img\b|!\[[^\]]*\]\(").is_match(text)
}

/// h1-h6 tags plus markdown heading lines
pub fn count_headings(text: &str) -> usize {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?im)<h[1-6]\b|^#{1,6}\s+\S").find_iter(text).count()
}

/// Top-level sectioning: section/article tags, h1/h2 headings,
/// markdown # and ## lines
pub fn count_sections(text: &str) -> usize {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?im)<section\b|<article\b|<h[12]\b|^#{1,2}\s+\S")
        .find_iter(text)
        .count()
}

/// Anchor tags, bare URLs and markdown links
pub fn count_links(text: &str) -> usize {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?i)<a\s|https?://\S+|\[[^\]]+\]\([^)]+\)")
        .find_iter(text)
        .count()
}

/// HTML tags per word; the classifier treats dense markup as HTML
pub fn html_tag_density(text: &str) -> f64 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let tags = re(&RE, r"</?[a-zA-Z][^>]*>").find_iter(text).count();
    let words = text.split_whitespace().count().max(1);
    tags as f64 / words as f64
}

/// JSON, YAML or XML markers indicating structured data
pub fn detect_structured_markers(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        return true;
    }
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return true;
    }
    // YAML: a run of key: value lines at the start of the document
    static RE: OnceLock<Regex> = OnceLock::new();
    let yaml_keys = re(&RE, r"(?m)^[\w-]+:\s+\S").find_iter(text).take(4).count();
    yaml_keys >= 3
}
