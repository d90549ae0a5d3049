//! Content classifier: raw content to structural profile.
//!
//! Classification must never fail the caller; any internal error degrades
//! to a fixed low-confidence fallback profile instead of propagating.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::patterns;
use crate::types::{
    ChunkingMethod, Complexity, ContentType, EmbeddingTier, RecommendedConfig, StructuralFeatures,
    StructuralProfile,
};

/// Tag density above which untyped content reads as HTML
const HTML_DENSITY_THRESHOLD: f64 = 0.05;

/// Stateless classification service. Constructed once and shared by
/// reference; holds no mutable state.
#[derive(Debug, Default)]
pub struct ContentClassifier;

impl ContentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one content item. Infallible by contract: internal errors
    /// yield the fallback profile (text/medium, confidence 0.3).
    pub fn classify(
        &self,
        content: &str,
        url: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> StructuralProfile {
        match self.classify_inner(content, url, metadata) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("classification failed, using fallback profile: {:?}", e);
                fallback_profile()
            }
        }
    }

    fn classify_inner(
        &self,
        content: &str,
        url: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> Result<StructuralProfile> {
        let content_type = resolve_content_type(content, url, metadata);

        let features = StructuralFeatures {
            has_tables: patterns::detect_tables(content),
            has_lists: patterns::detect_lists(content),
            has_code: patterns::detect_code(content),
            has_images: patterns::detect_images(content),
            section_count: patterns::count_sections(content),
            heading_count: patterns::count_headings(content),
            link_count: patterns::count_links(content),
        };

        let word_count = content.split_whitespace().count();
        let readability = readability_score(content);
        let complexity = score_complexity(word_count, &features, readability);
        let confidence = classification_confidence(content_type, complexity, &features);

        debug!(
            content_type = content_type.as_str(),
            complexity = complexity.as_str(),
            word_count,
            readability,
            confidence,
            "classified content"
        );

        Ok(StructuralProfile {
            content_type,
            complexity,
            features,
            word_count,
            language: detect_language(content),
            domain: url.and_then(extract_domain),
            readability,
            confidence,
            recommended: recommend_config(content_type, complexity),
        })
    }
}

/// Fixed low-confidence profile used whenever analysis fails
pub fn fallback_profile() -> StructuralProfile {
    StructuralProfile {
        content_type: ContentType::Text,
        complexity: Complexity::Medium,
        features: StructuralFeatures::default(),
        word_count: 0,
        language: "en".to_string(),
        domain: None,
        readability: 50.0,
        confidence: 0.3,
        recommended: recommend_config(ContentType::Text, Complexity::Medium),
    }
}

/// Deterministic cache key for identical raw content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolution priority: explicit metadata hint, then URL extension,
/// then content sniffing.
fn resolve_content_type(
    content: &str,
    url: Option<&str>,
    metadata: &HashMap<String, String>,
) -> ContentType {
    if let Some(hint) = metadata.get("content_type").or_else(|| metadata.get("type")) {
        if let Some(resolved) = parse_type_hint(hint) {
            return resolved;
        }
    }

    if let Some(url) = url {
        if let Some(resolved) = type_from_extension(url) {
            return resolved;
        }
    }

    sniff_content_type(content)
}

fn parse_type_hint(hint: &str) -> Option<ContentType> {
    match hint.to_ascii_lowercase().as_str() {
        "html" | "text/html" => Some(ContentType::Html),
        "pdf" | "application/pdf" => Some(ContentType::Pdf),
        "text" | "text/plain" | "markdown" => Some(ContentType::Text),
        "structured" | "json" | "yaml" | "xml" | "application/json" => {
            Some(ContentType::Structured)
        }
        "mixed" => Some(ContentType::Mixed),
        _ => None,
    }
}

fn type_from_extension(url: &str) -> Option<ContentType> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => Some(ContentType::Html),
        "pdf" => Some(ContentType::Pdf),
        "txt" | "md" => Some(ContentType::Text),
        "json" | "yaml" | "yml" | "xml" | "csv" => Some(ContentType::Structured),
        _ => None,
    }
}

/// Pattern sniffing: mixed when multiple signal classes co-occur
fn sniff_content_type(content: &str) -> ContentType {
    let html_signal = content.contains("<html")
        || patterns::html_tag_density(content) > HTML_DENSITY_THRESHOLD;
    let structured_signal = patterns::detect_structured_markers(content);

    match (html_signal, structured_signal) {
        (true, true) => ContentType::Mixed,
        (true, false) => ContentType::Html,
        (false, true) => ContentType::Structured,
        (false, false) => ContentType::Text,
    }
}

/// Flesch-Reading-Ease-style score, clamped to [0, 100]
pub fn readability_score(content: &str) -> f64 {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return 50.0;
    }
    let sentences = content
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let syllables: usize = words.iter().map(|w| estimate_syllables(w)).sum();

    let words_per_sentence = words.len() as f64 / sentences as f64;
    let syllables_per_word = syllables as f64 / words.len() as f64;

    (206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word).clamp(0.0, 100.0)
}

/// Crude vowel-run syllable estimate; short words count as one
fn estimate_syllables(word: &str) -> usize {
    let word: String = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    if word.len() <= 3 {
        return 1;
    }
    let mut count = 0;
    let mut prev_vowel = false;
    for c in word.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    count.max(1)
}

/// Weighted point accumulation thresholded into complexity bands
fn score_complexity(word_count: usize, features: &StructuralFeatures, readability: f64) -> Complexity {
    let mut points = 0u32;

    points += match word_count {
        0..=500 => 0,
        501..=2000 => 1,
        2001..=5000 => 2,
        _ => 3,
    };
    if features.section_count > 5 {
        points += 1;
    }
    if features.heading_count > 5 {
        points += 1;
    }
    if features.has_tables {
        points += 1;
    }
    if features.has_code {
        points += 1;
    }
    points += match readability {
        r if r < 30.0 => 2,
        r if r < 50.0 => 1,
        _ => 0,
    };

    match points {
        0..=2 => Complexity::Simple,
        3..=5 => Complexity::Medium,
        _ => Complexity::Complex,
    }
}

fn classification_confidence(
    content_type: ContentType,
    complexity: Complexity,
    features: &StructuralFeatures,
) -> f64 {
    let mut confidence: f64 = 0.8;
    if content_type == ContentType::Mixed {
        confidence -= 0.2;
    }
    if complexity == Complexity::Complex {
        confidence -= 0.1;
    }
    if features.section_count > 3 && features.heading_count > 2 {
        confidence += 0.1;
    }
    confidence.clamp(0.3, 1.0)
}

/// Stop-word vote across a handful of languages; defaults to English
fn detect_language(content: &str) -> String {
    const STOPWORDS: &[(&str, &[&str])] = &[
        ("en", &["the", "and", "of", "to", "is", "in", "that", "it"]),
        ("es", &["el", "la", "los", "las", "y", "que", "de", "una"]),
        ("fr", &["le", "la", "les", "et", "des", "une", "est", "dans"]),
        ("de", &["der", "die", "das", "und", "ist", "ein", "nicht", "mit"]),
    ];

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in content.split_whitespace().take(500) {
        let lower = word.to_ascii_lowercase();
        let lower = lower.trim_matches(|c: char| !c.is_alphabetic());
        for (lang, words) in STOPWORDS {
            if words.contains(&lower) {
                *counts.entry(lang).or_insert(0) += 1;
            }
        }
    }

    counts
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .max_by_key(|(_, n)| *n)
        .map(|(lang, _)| lang.to_string())
        .unwrap_or_else(|| "en".to_string())
}

fn extract_domain(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Chunking/embedding defaults by profile shape
fn recommend_config(content_type: ContentType, complexity: Complexity) -> RecommendedConfig {
    let (chunking_method, chunk_size, chunk_overlap) = match (content_type, complexity) {
        (_, Complexity::Simple) => (ChunkingMethod::Sentence, 512, 50),
        (ContentType::Html | ContentType::Mixed, _) => (ChunkingMethod::Semantic, 1000, 200),
        (ContentType::Pdf, _) => (ChunkingMethod::Section, 1500, 150),
        (ContentType::Structured, _) => (ChunkingMethod::Semantic, 800, 100),
        (ContentType::Text, _) => (ChunkingMethod::Paragraph, 1000, 100),
    };
    let embedding_tier = match complexity {
        Complexity::Simple => EmbeddingTier::Small,
        Complexity::Medium => EmbeddingTier::Standard,
        Complexity::Complex => EmbeddingTier::Large,
    };
    RecommendedConfig {
        chunking_method,
        chunk_size,
        chunk_overlap,
        embedding_tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(content: &str, url: Option<&str>) -> StructuralProfile {
        ContentClassifier::new().classify(content, url, &HashMap::new())
    }

    #[test]
    fn test_metadata_hint_wins() {
        let mut metadata = HashMap::new();
        metadata.insert("content_type".to_string(), "pdf".to_string());
        let profile =
            ContentClassifier::new().classify("<html><body>x</body></html>", None, &metadata);
        assert_eq!(profile.content_type, ContentType::Pdf);
    }

    #[test]
    fn test_url_extension_beats_sniffing() {
        let profile = classify("plain words only", Some("https://docs.example.com/guide.html"));
        assert_eq!(profile.content_type, ContentType::Html);
        assert_eq!(profile.domain.as_deref(), Some("docs.example.com"));
    }

    #[test]
    fn test_sniffs_html_and_structured() {
        let profile = classify("<html><body><p>hello there friend</p></body></html>", None);
        assert_eq!(profile.content_type, ContentType::Html);

        let profile = classify(r#"{"records": [1, 2, 3], "ok": true}"#, None);
        assert_eq!(profile.content_type, ContentType::Structured);

        let profile = classify("The quick brown fox jumps over the lazy dog.", None);
        assert_eq!(profile.content_type, ContentType::Text);
    }

    #[test]
    fn test_confidence_bounds() {
        for content in [
            "",
            "short",
            &"word ".repeat(8000),
            "<html><table><tr><td>x</td></tr></table></html>",
        ] {
            let profile = classify(content, None);
            assert!(profile.confidence >= 0.3 && profile.confidence <= 1.0);
        }
    }

    #[test]
    fn test_readability_range() {
        assert_eq!(readability_score(""), 50.0);
        let easy = readability_score("The cat sat. The dog ran. It was fun.");
        assert!(easy > 80.0, "easy prose should score high: {}", easy);
        let score = readability_score(&"incomprehensibility ".repeat(200));
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_syllable_estimate() {
        assert_eq!(estimate_syllables("cat"), 1); // short word rule
        assert_eq!(estimate_syllables("window"), 2);
        assert_eq!(estimate_syllables("readability"), 5);
    }

    #[test]
    fn test_simple_vs_complex() {
        let simple = classify("A short note. Nothing fancy here at all.", None);
        assert_eq!(simple.complexity, Complexity::Simple);

        // Long, heavily structured document with tables and code
        let mut complex = String::from("<html>");
        for i in 0..10 {
            complex.push_str(&format!("<h2>Section {}</h2>", i));
            complex.push_str(&"polysyllabic terminology investigation ".repeat(200));
        }
        complex.push_str("<table><tr><td>x</td></tr></table><code>fn x()</code></html>");
        let profile = classify(&complex, None);
        assert_eq!(profile.complexity, Complexity::Complex);
        // Clear sectioning raises confidence despite the complexity penalty
        assert!(profile.confidence >= 0.7);
    }

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash("same input"), content_hash("same input"));
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn test_language_detection() {
        let en = classify("the cat and the dog sat in the garden and it was warm", None);
        assert_eq!(en.language, "en");
        let es = classify("el perro y el gato en la casa que una vez", None);
        assert_eq!(es.language, "es");
    }
}
