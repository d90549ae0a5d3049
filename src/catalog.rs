//! Fixed strategy catalog.
//!
//! The catalog is a static, append-only registry populated once at startup.
//! Strategies are a closed enum rather than an open string map, so a name
//! lookup is a validated match and a typo cannot fall through silently.
//! `StrategyId::all()` order doubles as the documented tie-break order for
//! coordinator substitutions.

use serde::{Deserialize, Serialize};

use crate::types::{
    ChunkingMethod, Complexity, ContentType, EmbeddingTier, PerformanceProfile, StrategyDescriptor,
    VectorStoreKind,
};

/// Closed set of catalog entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    HtmlSection,
    HtmlSemantic,
    PdfDocument,
    TextParagraph,
    TextSentence,
    StructuredData,
    MixedContent,
    MobileOptimized,
}

impl StrategyId {
    /// Declaration order is catalog insertion order
    pub fn all() -> &'static [StrategyId] {
        &[
            StrategyId::HtmlSection,
            StrategyId::HtmlSemantic,
            StrategyId::PdfDocument,
            StrategyId::TextParagraph,
            StrategyId::TextSentence,
            StrategyId::StructuredData,
            StrategyId::MixedContent,
            StrategyId::MobileOptimized,
        ]
    }

    pub fn from_name(name: &str) -> Option<StrategyId> {
        StrategyId::all()
            .iter()
            .copied()
            .find(|id| id.descriptor().name == name)
    }

    pub fn descriptor(&self) -> StrategyDescriptor {
        use ChunkingMethod::*;
        use Complexity::*;
        use ContentType::*;

        match self {
            StrategyId::HtmlSection => StrategyDescriptor {
                id: *self,
                name: "HTML Section Processing",
                chunking_method: Section,
                chunk_size: 1200,
                chunk_overlap: 150,
                embedding_tier: EmbeddingTier::Large,
                vector_store: VectorStoreKind::Persistent,
                device_optimized: false,
                max_tokens: 4096,
                content_types: vec![Html],
                complexity_levels: vec![Medium, Complex],
                performance_profile: PerformanceProfile::Comprehensive,
            },
            StrategyId::HtmlSemantic => StrategyDescriptor {
                id: *self,
                name: "HTML Semantic Processing",
                chunking_method: Semantic,
                chunk_size: 1000,
                chunk_overlap: 200,
                embedding_tier: EmbeddingTier::Standard,
                vector_store: VectorStoreKind::Persistent,
                device_optimized: false,
                max_tokens: 4096,
                content_types: vec![Html, Mixed],
                complexity_levels: vec![Simple, Medium, Complex],
                performance_profile: PerformanceProfile::Balanced,
            },
            StrategyId::PdfDocument => StrategyDescriptor {
                id: *self,
                name: "PDF Document Processing",
                chunking_method: Section,
                chunk_size: 1500,
                chunk_overlap: 150,
                embedding_tier: EmbeddingTier::Standard,
                vector_store: VectorStoreKind::Persistent,
                device_optimized: false,
                max_tokens: 4096,
                content_types: vec![Pdf],
                complexity_levels: vec![Simple, Medium, Complex],
                performance_profile: PerformanceProfile::Balanced,
            },
            StrategyId::TextParagraph => StrategyDescriptor {
                id: *self,
                name: "Text Paragraph Processing",
                chunking_method: Paragraph,
                chunk_size: 1000,
                chunk_overlap: 100,
                embedding_tier: EmbeddingTier::Standard,
                vector_store: VectorStoreKind::Memory,
                device_optimized: false,
                max_tokens: 2048,
                content_types: vec![Text],
                complexity_levels: vec![Simple, Medium],
                performance_profile: PerformanceProfile::Balanced,
            },
            StrategyId::TextSentence => StrategyDescriptor {
                id: *self,
                name: "Text Sentence Processing",
                chunking_method: Sentence,
                chunk_size: 512,
                chunk_overlap: 50,
                embedding_tier: EmbeddingTier::Small,
                vector_store: VectorStoreKind::Memory,
                device_optimized: false,
                max_tokens: 1024,
                content_types: vec![Text],
                complexity_levels: vec![Simple],
                performance_profile: PerformanceProfile::Fast,
            },
            StrategyId::StructuredData => StrategyDescriptor {
                id: *self,
                name: "Structured Data Processing",
                chunking_method: Semantic,
                chunk_size: 800,
                chunk_overlap: 100,
                embedding_tier: EmbeddingTier::Standard,
                vector_store: VectorStoreKind::Hybrid,
                device_optimized: false,
                max_tokens: 2048,
                content_types: vec![Structured],
                complexity_levels: vec![Simple, Medium, Complex],
                performance_profile: PerformanceProfile::Balanced,
            },
            StrategyId::MixedContent => StrategyDescriptor {
                id: *self,
                name: "Mixed Content Processing",
                chunking_method: Semantic,
                chunk_size: 1000,
                chunk_overlap: 200,
                embedding_tier: EmbeddingTier::Large,
                vector_store: VectorStoreKind::Hybrid,
                device_optimized: false,
                max_tokens: 4096,
                content_types: vec![Mixed],
                complexity_levels: vec![Medium, Complex],
                performance_profile: PerformanceProfile::Comprehensive,
            },
            StrategyId::MobileOptimized => StrategyDescriptor {
                id: *self,
                name: "Mobile Optimized Processing",
                chunking_method: Paragraph,
                chunk_size: 600,
                chunk_overlap: 60,
                embedding_tier: EmbeddingTier::Small,
                vector_store: VectorStoreKind::Memory,
                device_optimized: true,
                max_tokens: 1024,
                content_types: vec![Html, Pdf, Text, Structured, Mixed],
                complexity_levels: vec![Simple, Medium, Complex],
                performance_profile: PerformanceProfile::Fast,
            },
        }
    }
}

/// The populated registry, built once at process start
#[derive(Debug, Clone)]
pub struct StrategyCatalog {
    entries: Vec<StrategyDescriptor>,
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyCatalog {
    pub fn new() -> Self {
        Self {
            entries: StrategyId::all().iter().map(|id| id.descriptor()).collect(),
        }
    }

    /// All entries in insertion order
    pub fn entries(&self) -> &[StrategyDescriptor] {
        &self.entries
    }

    pub fn get(&self, id: StrategyId) -> &StrategyDescriptor {
        // The constructor inserts every variant, so this always finds one.
        self.entries
            .iter()
            .find(|d| d.id == id)
            .expect("catalog populated with all variants")
    }

    pub fn by_name(&self, name: &str) -> Option<&StrategyDescriptor> {
        self.entries.iter().find(|d| d.name == name)
    }
}

/// Resident footprint of the embedding model, in MB
fn model_memory_mb(tier: EmbeddingTier) -> f64 {
    match tier {
        EmbeddingTier::Small => 80.0,
        EmbeddingTier::Standard => 420.0,
        EmbeddingTier::Large => 1200.0,
    }
}

fn store_overhead_factor(kind: VectorStoreKind) -> f64 {
    match kind {
        VectorStoreKind::Memory => 1.0,
        VectorStoreKind::Persistent => 1.5,
        VectorStoreKind::Hybrid => 2.0,
    }
}

/// Estimated peak memory to execute a strategy over a document of the
/// given word count: model footprint plus per-chunk text and vectors.
pub fn estimate_memory_mb(strategy: &StrategyDescriptor, word_count: usize) -> f64 {
    // Rough chars-per-word expansion to derive a chunk count
    let chars = word_count.saturating_mul(6).max(strategy.chunk_size);
    let chunks = (chars / strategy.chunk_size).max(1) as f64;
    let per_chunk_bytes =
        (strategy.embedding_tier.dimensions() * 4 + strategy.chunk_size) as f64;
    let chunk_mb =
        chunks * per_chunk_bytes * store_overhead_factor(strategy.vector_store) / (1024.0 * 1024.0);
    model_memory_mb(strategy.embedding_tier) + chunk_mb
}

/// Rough latency expectation by performance profile, scaled by size
pub fn estimate_latency_ms(strategy: &StrategyDescriptor, word_count: usize) -> u64 {
    let base: f64 = match strategy.performance_profile {
        PerformanceProfile::Fast => 800.0,
        PerformanceProfile::Balanced => 2500.0,
        PerformanceProfile::Comprehensive => 6000.0,
    };
    (base * (1.0 + word_count as f64 / 5000.0)) as u64
}

/// Accuracy expectation by performance profile
pub fn estimate_accuracy(strategy: &StrategyDescriptor) -> f64 {
    match strategy.performance_profile {
        PerformanceProfile::Fast => 0.7,
        PerformanceProfile::Balanced => 0.8,
        PerformanceProfile::Comprehensive => 0.9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_all_variants() {
        let catalog = StrategyCatalog::new();
        assert_eq!(catalog.entries().len(), StrategyId::all().len());
        for id in StrategyId::all() {
            assert_eq!(catalog.get(*id).id, *id);
        }
    }

    #[test]
    fn test_names_are_unique() {
        let catalog = StrategyCatalog::new();
        for entry in catalog.entries() {
            assert_eq!(StrategyId::from_name(entry.name), Some(entry.id));
        }
        assert!(StrategyId::from_name("No Such Strategy").is_none());
    }

    #[test]
    fn test_every_profile_shape_has_a_strategy() {
        let catalog = StrategyCatalog::new();
        for content_type in [
            ContentType::Html,
            ContentType::Pdf,
            ContentType::Text,
            ContentType::Structured,
            ContentType::Mixed,
        ] {
            for complexity in [Complexity::Simple, Complexity::Medium, Complexity::Complex] {
                let covered = catalog.entries().iter().any(|d| {
                    d.content_types.contains(&content_type)
                        && d.complexity_levels.contains(&complexity)
                });
                assert!(covered, "{:?}/{:?} uncovered", content_type, complexity);
            }
        }
    }

    #[test]
    fn test_memory_estimate_scales_with_tier() {
        let catalog = StrategyCatalog::new();
        let mobile = catalog.get(StrategyId::MobileOptimized);
        let html = catalog.get(StrategyId::HtmlSection);
        assert!(estimate_memory_mb(mobile, 1000) < estimate_memory_mb(html, 1000));
        // A small model on a small document fits a 512MB device at 50%
        assert!(estimate_memory_mb(mobile, 300) < 256.0);
    }
}
