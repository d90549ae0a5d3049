//! Strategy selection: admissibility filter, weighted ranking, fallback.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::{estimate_accuracy, estimate_latency_ms, estimate_memory_mb, StrategyCatalog, StrategyId};
use crate::memory::{MemoryQuery, RecordKind, SharedMemoryStore, SortBy};
use crate::scoring::{self, ScoreWeights};
use crate::types::{
    ChunkingMethod, DeviceConstraints, EmbeddingTier, PerformanceEstimate, PerformanceObservation,
    StrategyDescriptor, StrategySelection, StructuralProfile, UserPreferences,
};

/// Confidence assigned when no catalog entry is admissible
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// A strategy may claim at most half of the device's available memory
const ADMISSIBLE_MEMORY_RATIO: f64 = 0.5;

/// Scoring reads at most this many recent observations per history bucket
const HISTORY_WINDOW: usize = 50;

/// Ranks catalog strategies against a structural profile, device
/// constraints and learned performance history.
pub struct StrategySelector {
    catalog: Arc<StrategyCatalog>,
    store: SharedMemoryStore,
    weights: ScoreWeights,
}

impl StrategySelector {
    pub fn new(catalog: Arc<StrategyCatalog>, store: SharedMemoryStore) -> Self {
        Self {
            catalog,
            store,
            weights: ScoreWeights::default(),
        }
    }

    /// Select the best admissible strategy for the profile.
    ///
    /// Treated as potentially blocking by the coordinator (wrapped in a
    /// timeout), although the reference computation is pure CPU.
    pub async fn select(
        &self,
        profile: &StructuralProfile,
        device: &DeviceConstraints,
        prefs: Option<&UserPreferences>,
    ) -> StrategySelection {
        let admissible: Vec<&StrategyDescriptor> = self
            .catalog
            .entries()
            .iter()
            .filter(|s| is_admissible(s, profile, device))
            .collect();

        if admissible.is_empty() {
            warn!(
                content_type = profile.content_type.as_str(),
                device_class = %device.device_class(),
                "no admissible strategy, using fallback"
            );
            return self.fallback_selection(profile, device);
        }

        let device_class = device.device_class();
        let mut scored: Vec<(f64, &StrategyDescriptor)> = admissible
            .into_iter()
            .map(|s| {
                let history = self.load_history(s.name, profile, &device_class);
                let score =
                    scoring::total_score(s, profile, device, prefs, &history, &self.weights);
                debug!(strategy = s.name, score, runs = history.len(), "scored strategy");
                (score, s)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let (top_score, chosen) = scored[0];
        let alternatives: Vec<StrategyDescriptor> =
            scored.iter().skip(1).take(3).map(|(_, s)| (*s).clone()).collect();

        StrategySelection {
            reasoning: build_reasoning(chosen, profile, device, top_score),
            estimate: build_estimate(chosen, profile),
            chosen: chosen.clone(),
            alternatives,
            confidence: top_score.clamp(0.0, 1.0),
        }
    }

    /// Device-appropriate fallback with fixed low confidence
    pub fn fallback_selection(
        &self,
        profile: &StructuralProfile,
        device: &DeviceConstraints,
    ) -> StrategySelection {
        let id = if device.is_mobile {
            StrategyId::MobileOptimized
        } else {
            StrategyId::TextParagraph
        };
        let chosen = self.catalog.get(id).clone();
        StrategySelection {
            reasoning: format!(
                "no admissible strategy for {}/{}; fell back to {}",
                profile.content_type.as_str(),
                profile.complexity.as_str(),
                chosen.name
            ),
            estimate: build_estimate(&chosen, profile),
            chosen,
            alternatives: vec![],
            confidence: FALLBACK_CONFIDENCE,
        }
    }

    /// Most recent observations for (strategy, type, complexity, device class)
    fn load_history(
        &self,
        strategy_name: &str,
        profile: &StructuralProfile,
        device_class: &str,
    ) -> Vec<PerformanceObservation> {
        let key = PerformanceObservation::history_key(
            strategy_name,
            profile.content_type,
            profile.complexity,
            device_class,
        );
        self.store
            .query(&MemoryQuery {
                kind: Some(RecordKind::StrategyPerformance),
                key: Some(key),
                sort_by: SortBy::CreatedAt,
                limit: Some(HISTORY_WINDOW),
                ..Default::default()
            })
            .into_iter()
            .filter_map(|r| serde_json::from_value(r.payload).ok())
            .collect()
    }
}

/// Hard constraints a strategy must satisfy before being scored
pub fn is_admissible(
    strategy: &StrategyDescriptor,
    profile: &StructuralProfile,
    device: &DeviceConstraints,
) -> bool {
    if !strategy.content_types.contains(&profile.content_type) {
        return false;
    }
    if !strategy.complexity_levels.contains(&profile.complexity) {
        return false;
    }
    if device.is_mobile && !strategy.device_optimized {
        return false;
    }
    // Offline devices cannot pull anything beyond the minimal embedding model
    if !device.has_internet && strategy.embedding_tier != EmbeddingTier::Small {
        return false;
    }
    estimate_memory_mb(strategy, profile.word_count)
        <= device.memory_available_mb * ADMISSIBLE_MEMORY_RATIO
}

fn build_estimate(strategy: &StrategyDescriptor, profile: &StructuralProfile) -> PerformanceEstimate {
    PerformanceEstimate {
        expected_latency_ms: estimate_latency_ms(strategy, profile.word_count),
        estimated_memory_mb: estimate_memory_mb(strategy, profile.word_count),
        expected_accuracy: estimate_accuracy(strategy),
    }
}

/// Human-readable justification assembled from triggered rules.
/// Advisory metadata only; never fed back into the decision logic.
fn build_reasoning(
    strategy: &StrategyDescriptor,
    profile: &StructuralProfile,
    device: &DeviceConstraints,
    score: f64,
) -> String {
    let mut reasons = Vec::new();

    if strategy.content_types.contains(&profile.content_type) {
        reasons.push(format!(
            "handles {} content natively",
            profile.content_type.as_str()
        ));
    }
    if strategy.complexity_levels.contains(&profile.complexity) {
        reasons.push(format!(
            "rated for {} complexity",
            profile.complexity.as_str()
        ));
    }
    if device.is_mobile && strategy.device_optimized {
        reasons.push("optimized for mobile devices".to_string());
    }
    match strategy.chunking_method {
        ChunkingMethod::Section if profile.features.section_count > 5 => {
            reasons.push(format!(
                "section chunking suits {} sections",
                profile.features.section_count
            ));
        }
        ChunkingMethod::Semantic if profile.features.has_tables => {
            reasons.push("semantic chunking preserves table context".to_string());
        }
        _ => {}
    }
    let band = if score >= 0.75 {
        "high"
    } else if score >= 0.5 {
        "moderate"
    } else {
        "low"
    };
    reasons.push(format!("{} confidence ({:.2})", band, score));

    reasons.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStoreConfig;
    use crate::memory::MemoryStore;
    use crate::types::{
        Complexity, ContentType, ProcessingPower, RecommendedConfig, StructuralFeatures,
    };

    fn selector() -> StrategySelector {
        StrategySelector::new(
            Arc::new(StrategyCatalog::new()),
            MemoryStore::new(MemoryStoreConfig::default()),
        )
    }

    fn profile(content_type: ContentType, complexity: Complexity) -> StructuralProfile {
        StructuralProfile {
            content_type,
            complexity,
            features: StructuralFeatures::default(),
            word_count: 800,
            language: "en".to_string(),
            domain: None,
            readability: 65.0,
            confidence: 0.8,
            recommended: RecommendedConfig {
                chunking_method: ChunkingMethod::Paragraph,
                chunk_size: 1000,
                chunk_overlap: 100,
                embedding_tier: EmbeddingTier::Standard,
            },
        }
    }

    #[tokio::test]
    async fn test_admissibility_soundness() {
        let selector = selector();
        let profile = profile(ContentType::Html, Complexity::Medium);
        let device = DeviceConstraints::desktop();

        let selection = selector.select(&profile, &device, None).await;
        for strategy in std::iter::once(&selection.chosen).chain(selection.alternatives.iter()) {
            assert!(strategy.content_types.contains(&profile.content_type));
            assert!(strategy.complexity_levels.contains(&profile.complexity));
            assert!(
                estimate_memory_mb(strategy, profile.word_count)
                    <= device.memory_available_mb * 0.5
            );
        }
    }

    #[tokio::test]
    async fn test_mobile_offline_constraints() {
        let selector = selector();
        let profile = profile(ContentType::Text, Complexity::Simple);
        let device = DeviceConstraints {
            is_mobile: true,
            has_internet: false,
            processing_power: ProcessingPower::Low,
            memory_available_mb: 512.0,
        };

        let selection = selector.select(&profile, &device, None).await;
        assert!(selection.chosen.device_optimized);
        assert_eq!(selection.chosen.vector_store, crate::types::VectorStoreKind::Memory);
        assert!(!selection.chosen.embedding_tier.model_name().contains("large"));
    }

    #[tokio::test]
    async fn test_fallback_when_nothing_admissible() {
        let selector = selector();
        // Complex text matches no text strategy; offline plus a tiny memory
        // budget also rules out the catch-all mobile entry.
        let profile = profile(ContentType::Text, Complexity::Complex);
        let mut device = DeviceConstraints::desktop();
        device.has_internet = false;
        device.memory_available_mb = 100.0;
        let selection = selector.select(&profile, &device, None).await;
        assert_eq!(selection.confidence, 0.3);
        assert_eq!(selection.chosen.name, "Text Paragraph Processing");
        assert!(selection.reasoning.contains("fell back"));
    }

    #[tokio::test]
    async fn test_confidence_in_unit_interval() {
        let selector = selector();
        for content_type in [ContentType::Html, ContentType::Text, ContentType::Mixed] {
            for complexity in [Complexity::Simple, Complexity::Medium, Complexity::Complex] {
                let selection = selector
                    .select(
                        &profile(content_type, complexity),
                        &DeviceConstraints::desktop(),
                        None,
                    )
                    .await;
                assert!((0.0..=1.0).contains(&selection.confidence));
                assert!(selection.alternatives.len() <= 3);
            }
        }
    }

    #[test]
    fn test_speed_preference_biases_toward_fast() {
        let selector = selector();
        let profile = profile(ContentType::Text, Complexity::Simple);
        let prefs = UserPreferences {
            prioritize_speed: Some(true),
            ..Default::default()
        };
        let selection = tokio_test::block_on(selector.select(
            &profile,
            &DeviceConstraints::desktop(),
            Some(&prefs),
        ));
        assert_eq!(
            selection.chosen.performance_profile,
            crate::types::PerformanceProfile::Fast
        );
    }
}
