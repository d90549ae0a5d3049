//! Error taxonomy for the strategy engine.
//!
//! Classification and selection failures are normally absorbed at their own
//! boundary (fallback profile / fallback strategy); they only surface as
//! `EngineError` when `fallback_on_error` is disabled.

use crate::types::WorkflowStage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("classification failed: {0}")]
    Classification(String),

    #[error("strategy selection failed: {0}")]
    Selection(String),

    #[error("stage {stage:?} timed out after {timeout_ms}ms")]
    StageTimeout { stage: WorkflowStage, timeout_ms: u64 },

    #[error("workflow failed: {0}")]
    Workflow(String),
}

impl EngineError {
    /// Stage the error is attributed to in workflow messages
    pub fn stage(&self) -> WorkflowStage {
        match self {
            EngineError::Classification(_) => WorkflowStage::Classifying,
            EngineError::Selection(_) => WorkflowStage::Selecting,
            EngineError::StageTimeout { stage, .. } => *stage,
            EngineError::Workflow(_) => WorkflowStage::Errored,
        }
    }
}
