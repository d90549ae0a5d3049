//! Sub-score functions for strategy ranking.
//!
//! Each sub-score is normalized to [0, 1] and combined as a weighted sum by
//! the selector. Bonuses are additive on a 0.5 base and clamped.

use crate::catalog::estimate_memory_mb;
use crate::types::{
    ChunkingMethod, Complexity, ContentType, DeviceConstraints, EmbeddingTier,
    PerformanceObservation, PerformanceProfile, ProcessingPower, StrategyDescriptor,
    StructuralProfile, UserPreferences,
};

/// Weights for the five sub-scores
#[derive(Debug, Clone)]
pub struct ScoreWeights {
    pub content: f64,
    pub device: f64,
    pub preference: f64,
    pub accuracy: f64,
    pub history: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            content: 0.30,
            device: 0.25,
            preference: 0.20,
            accuracy: 0.10,
            history: 0.15,
        }
    }
}

/// Normalized latency ceiling: anything at or beyond 10s scores zero
const LATENCY_CEILING_MS: f64 = 10_000.0;

/// Content compatibility: type/complexity matches plus feature-specific fit
pub fn content_score(strategy: &StrategyDescriptor, profile: &StructuralProfile) -> f64 {
    let mut score: f64 = 0.5;
    if strategy.content_types.contains(&profile.content_type) {
        score += 0.3;
    }
    if strategy.complexity_levels.contains(&profile.complexity) {
        score += 0.2;
    }
    if profile.features.has_tables && strategy.chunking_method == ChunkingMethod::Semantic {
        score += 0.1;
    }
    if profile.features.has_code && strategy.chunking_method == ChunkingMethod::Section {
        score += 0.1;
    }
    if profile.features.section_count > 5 && strategy.chunking_method == ChunkingMethod::Section {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Device compatibility: mobile optimization and power-tier alignment
pub fn device_score(strategy: &StrategyDescriptor, device: &DeviceConstraints) -> f64 {
    let mut score: f64 = 0.5;
    if device.is_mobile && strategy.device_optimized {
        score += 0.3;
    }
    let power_match = matches!(
        (device.processing_power, strategy.performance_profile),
        (ProcessingPower::Low, PerformanceProfile::Fast)
            | (ProcessingPower::Medium, PerformanceProfile::Balanced)
            | (ProcessingPower::High, PerformanceProfile::Comprehensive)
    );
    if power_match {
        score += 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// Performance/user-preference fit: explicit hints, memory headroom,
/// small-embedding fit for constrained networks
pub fn preference_score(
    strategy: &StrategyDescriptor,
    profile: &StructuralProfile,
    device: &DeviceConstraints,
    prefs: Option<&UserPreferences>,
) -> f64 {
    let mut score: f64 = 0.5;

    if let Some(prefs) = prefs {
        let speed_aligned = prefs.prioritize_speed.unwrap_or(false)
            && strategy.performance_profile == PerformanceProfile::Fast;
        let accuracy_aligned = prefs.prioritize_accuracy.unwrap_or(false)
            && strategy.performance_profile == PerformanceProfile::Comprehensive;
        if speed_aligned || accuracy_aligned {
            score += 0.3;
        }
    }

    // Comfortable memory headroom: under a quarter of what's available
    if estimate_memory_mb(strategy, profile.word_count) <= device.memory_available_mb * 0.25 {
        score += 0.2;
    }

    if strategy.embedding_tier == EmbeddingTier::Small && !device.has_internet {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

/// Accuracy proxy: embedding capacity and chunking fit for the content shape
pub fn accuracy_score(strategy: &StrategyDescriptor, profile: &StructuralProfile) -> f64 {
    let mut score: f64 = 0.5;
    if strategy.embedding_tier == EmbeddingTier::Large {
        score += 0.3;
    }
    let chunking_fit = match profile.complexity {
        Complexity::Complex => strategy.chunking_method == ChunkingMethod::Semantic,
        Complexity::Simple => strategy.chunking_method == ChunkingMethod::Sentence,
        Complexity::Medium => false,
    };
    if chunking_fit {
        score += 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// Historical performance: weighted blend of normalized latency, observed
/// accuracy and success rate. Neutral 0.5 with no history.
pub fn history_score(observations: &[PerformanceObservation]) -> f64 {
    if observations.is_empty() {
        return 0.5;
    }
    let n = observations.len() as f64;
    let avg_latency =
        observations.iter().map(|o| o.latency_ms as f64).sum::<f64>() / n;
    let avg_accuracy = observations.iter().map(|o| o.accuracy).sum::<f64>() / n;
    let success_rate =
        observations.iter().filter(|o| o.success).count() as f64 / n;

    let latency_score = 1.0 - (avg_latency / LATENCY_CEILING_MS).clamp(0.0, 1.0);

    (0.3 * latency_score + 0.4 * avg_accuracy + 0.3 * success_rate).clamp(0.0, 1.0)
}

/// Weighted total over the five sub-scores
pub fn total_score(
    strategy: &StrategyDescriptor,
    profile: &StructuralProfile,
    device: &DeviceConstraints,
    prefs: Option<&UserPreferences>,
    history: &[PerformanceObservation],
    weights: &ScoreWeights,
) -> f64 {
    let total = weights.content * content_score(strategy, profile)
        + weights.device * device_score(strategy, device)
        + weights.preference * preference_score(strategy, profile, device, prefs)
        + weights.accuracy * accuracy_score(strategy, profile)
        + weights.history * history_score(history);
    total.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StrategyCatalog, StrategyId};
    use crate::types::{RecommendedConfig, StructuralFeatures};

    fn profile(content_type: ContentType, complexity: Complexity) -> StructuralProfile {
        StructuralProfile {
            content_type,
            complexity,
            features: StructuralFeatures::default(),
            word_count: 1000,
            language: "en".to_string(),
            domain: None,
            readability: 60.0,
            confidence: 0.8,
            recommended: RecommendedConfig {
                chunking_method: ChunkingMethod::Paragraph,
                chunk_size: 1000,
                chunk_overlap: 100,
                embedding_tier: EmbeddingTier::Standard,
            },
        }
    }

    fn observation(latency_ms: u64, accuracy: f64, success: bool) -> PerformanceObservation {
        PerformanceObservation {
            strategy: "Text Paragraph Processing".to_string(),
            content_type: ContentType::Text,
            complexity: Complexity::Medium,
            device_class: "desktop-high".to_string(),
            latency_ms,
            memory_mb: 100.0,
            accuracy,
            success,
        }
    }

    #[test]
    fn test_content_score_rewards_matches() {
        let catalog = StrategyCatalog::new();
        let text = catalog.get(StrategyId::TextParagraph);
        let html = catalog.get(StrategyId::HtmlSection);

        let p = profile(ContentType::Text, Complexity::Medium);
        assert!(content_score(text, &p) > content_score(html, &p));
    }

    #[test]
    fn test_section_bonus_for_sectioned_documents() {
        let catalog = StrategyCatalog::new();
        let section = catalog.get(StrategyId::HtmlSection);
        let mut p = profile(ContentType::Html, Complexity::Medium);
        let base = content_score(section, &p);
        p.features.section_count = 8;
        assert!(content_score(section, &p) >= base);
    }

    #[test]
    fn test_device_score_mobile_optimized() {
        let catalog = StrategyCatalog::new();
        let mobile = catalog.get(StrategyId::MobileOptimized);
        let device = DeviceConstraints {
            is_mobile: true,
            has_internet: false,
            processing_power: ProcessingPower::Low,
            memory_available_mb: 512.0,
        };
        // mobile+optimized and low↔fast both hit
        assert!((device_score(mobile, &device) - 1.0).abs() < 1e-9);
        assert!((device_score(mobile, &DeviceConstraints::desktop()) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_history_score_neutral_without_observations() {
        assert!((history_score(&[]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_history_score_blend() {
        // 5 runs, avg 500ms, accuracy 0.9, all successful
        let obs: Vec<_> = (0..5).map(|_| observation(500, 0.9, true)).collect();
        let score = history_score(&obs);
        // 0.3*0.95 + 0.4*0.9 + 0.3*1.0
        assert!((score - 0.945).abs() < 1e-6);
        assert!(score > 0.5);
    }

    #[test]
    fn test_history_score_punishes_slow_failures() {
        let obs: Vec<_> = (0..5).map(|_| observation(12_000, 0.2, false)).collect();
        assert!(history_score(&obs) < 0.2);
    }

    #[test]
    fn test_total_score_in_unit_range() {
        let catalog = StrategyCatalog::new();
        let p = profile(ContentType::Html, Complexity::Complex);
        let device = DeviceConstraints::desktop();
        for entry in catalog.entries() {
            let score = total_score(entry, &p, &device, None, &[], &ScoreWeights::default());
            assert!((0.0..=1.0).contains(&score));
        }
    }
}
