//! Stratagen - Adaptive Content-Processing Strategy Engine
//!
//! Picks a retrieval-augmented processing strategy per document by:
//! - Classifying content into a structural profile
//! - Filtering a fixed strategy catalog by hard device/content constraints
//! - Ranking admissible strategies with a weighted multi-factor score
//! - Learning from execution outcomes via a TTL-bounded memory store

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod memory;
pub mod patterns;
pub mod scoring;
pub mod selection;
pub mod server;
pub mod types;
pub mod workflow;

pub use catalog::{StrategyCatalog, StrategyId};
pub use classifier::ContentClassifier;
pub use config::{EngineConfig, MemoryStoreConfig};
pub use error::EngineError;
pub use memory::{MemoryQuery, MemoryStore, MemorySweeper, RecordKind, SharedMemoryStore};
pub use selection::StrategySelector;
pub use types::*;
pub use workflow::{ExecutionDelegate, NoopDelegate, SharedCoordinator, WorkflowCoordinator};
