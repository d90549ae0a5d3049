//! Core type definitions for the adaptive strategy engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Resolved content type of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Html,
    Pdf,
    Text,
    Structured,
    Mixed,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Html => "html",
            ContentType::Pdf => "pdf",
            ContentType::Text => "text",
            ContentType::Structured => "structured",
            ContentType::Mixed => "mixed",
        }
    }
}

/// Structural complexity band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

/// Feature flags and counts extracted by the pattern scans
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StructuralFeatures {
    pub has_tables: bool,
    pub has_lists: bool,
    pub has_code: bool,
    pub has_images: bool,
    pub section_count: usize,
    pub heading_count: usize,
    pub link_count: usize,
}

/// Chunking/embedding configuration recommended by the classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedConfig {
    pub chunking_method: ChunkingMethod,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_tier: EmbeddingTier,
}

/// Derived structural profile of one content item.
///
/// Immutable once produced; a content change produces a new profile
/// (and a new cache key), never a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralProfile {
    pub content_type: ContentType,
    pub complexity: Complexity,
    pub features: StructuralFeatures,
    pub word_count: usize,
    pub language: String,
    pub domain: Option<String>,
    /// Flesch-style readability, clamped to [0, 100]
    pub readability: f64,
    /// Classifier confidence, clamped to [0.3, 1.0]
    pub confidence: f64,
    pub recommended: RecommendedConfig,
}

/// Chunking method used by a processing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMethod {
    Semantic,
    Section,
    Paragraph,
    Sentence,
    Fixed,
}

/// Embedding model tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingTier {
    Small,
    Standard,
    Large,
}

impl EmbeddingTier {
    pub fn model_name(&self) -> &'static str {
        match self {
            EmbeddingTier::Small => "all-minilm-l6-v2",
            EmbeddingTier::Standard => "mpnet-base-v2",
            EmbeddingTier::Large => "e5-large-v2",
        }
    }

    /// Embedding width in f32 components
    pub fn dimensions(&self) -> usize {
        match self {
            EmbeddingTier::Small => 384,
            EmbeddingTier::Standard => 768,
            EmbeddingTier::Large => 1024,
        }
    }
}

/// Where chunk vectors are kept during retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    Memory,
    Persistent,
    Hybrid,
}

/// Latency/quality trade-off class of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceProfile {
    Fast,
    Balanced,
    Comprehensive,
}

/// One named catalog entry. Entries are constructed once at startup
/// and never mutated at runtime.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyDescriptor {
    pub id: crate::catalog::StrategyId,
    pub name: &'static str,
    pub chunking_method: ChunkingMethod,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_tier: EmbeddingTier,
    pub vector_store: VectorStoreKind,
    pub device_optimized: bool,
    pub max_tokens: usize,
    pub content_types: Vec<ContentType>,
    pub complexity_levels: Vec<Complexity>,
    pub performance_profile: PerformanceProfile,
}

/// Device descriptor supplied by the device-detection collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConstraints {
    pub is_mobile: bool,
    pub has_internet: bool,
    pub processing_power: ProcessingPower,
    pub memory_available_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingPower {
    Low,
    Medium,
    High,
}

impl DeviceConstraints {
    /// Coarse class string used to bucket performance history
    pub fn device_class(&self) -> String {
        let form = if self.is_mobile { "mobile" } else { "desktop" };
        let power = match self.processing_power {
            ProcessingPower::Low => "low",
            ProcessingPower::Medium => "medium",
            ProcessingPower::High => "high",
        };
        format!("{}-{}", form, power)
    }

    pub fn desktop() -> Self {
        Self {
            is_mobile: false,
            has_internet: true,
            processing_power: ProcessingPower::High,
            memory_available_mb: 8192.0,
        }
    }
}

/// Optional user hints influencing selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    pub prioritize_speed: Option<bool>,
    pub prioritize_accuracy: Option<bool>,
    pub max_processing_time_ms: Option<u64>,
}

/// Kind of an audit message exchanged between workflow stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
}

/// Audit record of one inter-stage exchange. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMessage {
    pub workflow_id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub from_stage: WorkflowStage,
    pub to_stage: WorkflowStage,
    pub kind: MessageKind,
    pub payload: String,
    pub priority: u8,
    pub timeout_ms: Option<u64>,
    pub retry_count: u32,
}

/// Workflow state machine stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStage {
    Started,
    Classifying,
    Selecting,
    Validating,
    Delegating,
    Recording,
    Completed,
    Errored,
}

/// Request to run one processing workflow
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub content: String,
    pub url: Option<String>,
    pub metadata: HashMap<String, String>,
    pub device: DeviceConstraints,
    pub preferences: Option<UserPreferences>,
}

/// Expected cost/quality of executing the chosen strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceEstimate {
    pub expected_latency_ms: u64,
    pub estimated_memory_mb: f64,
    pub expected_accuracy: f64,
}

/// Output of the selector: ranked strategies plus advisory metadata
#[derive(Debug, Clone, Serialize)]
pub struct StrategySelection {
    pub chosen: StrategyDescriptor,
    pub alternatives: Vec<StrategyDescriptor>,
    pub confidence: f64,
    pub estimate: PerformanceEstimate,
    pub reasoning: String,
}

/// Final result of one workflow
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub workflow_id: uuid::Uuid,
    pub content_analysis: StructuralProfile,
    pub strategy_selection: StrategySelection,
    pub final_strategy: StrategyDescriptor,
    pub confidence: f64,
    pub total_processing_time_ms: u64,
    pub classification_cached: bool,
    pub messages: Vec<WorkflowMessage>,
}

/// One observed execution, appended to the performance history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceObservation {
    pub strategy: String,
    pub content_type: ContentType,
    pub complexity: Complexity,
    pub device_class: String,
    pub latency_ms: u64,
    pub memory_mb: f64,
    pub accuracy: f64,
    pub success: bool,
}

impl PerformanceObservation {
    /// History lookup key shared by the recorder and the scorer
    pub fn history_key(
        strategy: &str,
        content_type: ContentType,
        complexity: Complexity,
        device_class: &str,
    ) -> String {
        format!(
            "perf/{}/{}/{}/{}",
            strategy,
            content_type.as_str(),
            complexity.as_str(),
            device_class
        )
    }
}

/// Aggregated occurrence stats per (content type, complexity) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPatternStats {
    pub content_type: ContentType,
    pub complexity: Complexity,
    pub occurrences: u64,
    /// Grows asymptotically toward 1.0 on repeated observation
    pub confidence: f64,
}

impl ContentPatternStats {
    pub fn pattern_key(content_type: ContentType, complexity: Complexity) -> String {
        format!("pattern/{}/{}", content_type.as_str(), complexity.as_str())
    }
}

/// Snapshot of memory store contents
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_entries: usize,
    pub by_kind: HashMap<String, usize>,
    pub estimated_bytes: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub most_accessed_key: Option<String>,
    pub avg_confidence: f64,
}

/// Helper for expressing TTLs in whole hours
pub fn hours(n: u64) -> Duration {
    Duration::from_secs(n * 3600)
}
