//! Workflow coordinator: classify → select → validate → delegate → record.
//!
//! One workflow per request with its own ordered message log. Stage calls
//! are wrapped in cancellable timeouts; stage errors either propagate as
//! `EngineError` or, with `fallback_on_error`, degrade into a completed
//! low-confidence result. Every completed workflow writes a performance
//! observation back to the memory store, which is what feeds the
//! historical sub-score of future selections.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{estimate_memory_mb, StrategyCatalog, StrategyId};
use crate::classifier::{content_hash, fallback_profile, ContentClassifier};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::memory::{PutOptions, RecordKind, SharedMemoryStore};
use crate::selection::StrategySelector;
use crate::types::{
    MemoryStats, MessageKind, PerformanceObservation, ProcessRequest, StrategyDescriptor,
    StrategySelection, StructuralProfile, WorkflowMessage, WorkflowResult, WorkflowStage,
};

/// Confidence reported on the fallback path
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Fixed penalty applied when composing stage confidences
const COORDINATION_PENALTY: f64 = 0.05;

/// Substitution threshold: estimated memory over this share of available
/// memory triggers an alternative during validation
const VALIDATION_MEMORY_RATIO: f64 = 0.8;

/// Finished workflows retained for introspection; older entries are evicted
pub const RETAINED_WORKFLOWS: usize = 100;

/// Outcome reported by the execution delegate
#[derive(Debug, Clone, Default)]
pub struct DelegateOutcome {
    pub latency_ms: u64,
    pub accuracy: Option<f64>,
}

/// The external executor that performs the actual chunk/embed/retrieve/
/// generate steps. Opaque to the engine; long-latency and cancellable.
#[async_trait]
pub trait ExecutionDelegate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        strategy: &StrategyDescriptor,
        profile: &StructuralProfile,
        content: &str,
    ) -> anyhow::Result<DelegateOutcome>;
}

/// Delegate that acknowledges without doing work. Used when the engine is
/// wired without a real executor and in tests.
pub struct NoopDelegate;

#[async_trait]
impl ExecutionDelegate for NoopDelegate {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn execute(
        &self,
        _strategy: &StrategyDescriptor,
        _profile: &StructuralProfile,
        _content: &str,
    ) -> anyhow::Result<DelegateOutcome> {
        Ok(DelegateOutcome::default())
    }
}

/// Coordinates one workflow per request. Thread-safe via Arc; all service
/// dependencies are injected at construction.
pub struct WorkflowCoordinator {
    store: SharedMemoryStore,
    classifier: ContentClassifier,
    selector: StrategySelector,
    catalog: Arc<StrategyCatalog>,
    delegate: Box<dyn ExecutionDelegate>,
    config: EngineConfig,
    workflows: DashMap<Uuid, Vec<WorkflowMessage>>,
    finished: Mutex<VecDeque<Uuid>>,
}

pub type SharedCoordinator = Arc<WorkflowCoordinator>;

impl WorkflowCoordinator {
    pub fn new(
        store: SharedMemoryStore,
        classifier: ContentClassifier,
        selector: StrategySelector,
        catalog: Arc<StrategyCatalog>,
        delegate: Box<dyn ExecutionDelegate>,
        config: EngineConfig,
    ) -> SharedCoordinator {
        Arc::new(Self {
            store,
            classifier,
            selector,
            catalog,
            delegate,
            config,
            workflows: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
        })
    }

    /// Convenience constructor wiring the default service graph
    pub fn with_defaults(config: EngineConfig) -> SharedCoordinator {
        let store = crate::memory::MemoryStore::new(config.memory.clone());
        let catalog = Arc::new(StrategyCatalog::new());
        let selector = StrategySelector::new(Arc::clone(&catalog), Arc::clone(&store));
        Self::new(
            store,
            ContentClassifier::new(),
            selector,
            catalog,
            Box::new(NoopDelegate),
            config,
        )
    }

    /// Run one workflow end to end.
    ///
    /// With `fallback_on_error` set (the default), every input yields a
    /// structurally complete result; otherwise stage errors propagate.
    pub async fn process(&self, req: ProcessRequest) -> Result<WorkflowResult, EngineError> {
        let workflow_id = Uuid::new_v4();
        let start = Instant::now();
        self.workflows.insert(workflow_id, Vec::new());

        info!(%workflow_id, device = %req.device.device_class(), "workflow started");
        self.push_message(
            workflow_id,
            WorkflowStage::Started,
            WorkflowStage::Classifying,
            MessageKind::Request,
            format!("content: {} bytes", req.content.len()),
        );

        let outcome = match self.run_stages(workflow_id, &req, start).await {
            Ok(result) => Ok(result),
            Err(err) if self.config.fallback_on_error => {
                warn!(%workflow_id, error = %err, "stage failed, taking fallback path");
                Ok(self.fallback_result(workflow_id, &req, &err, start))
            }
            Err(err) => {
                self.push_message(
                    workflow_id,
                    err.stage(),
                    WorkflowStage::Errored,
                    MessageKind::Error,
                    err.to_string(),
                );
                Err(err)
            }
        };
        self.finish_workflow(workflow_id);
        outcome
    }

    /// Move a workflow into the bounded retained set, evicting the oldest
    /// message lists once the cap is reached.
    fn finish_workflow(&self, workflow_id: Uuid) {
        if let Ok(mut finished) = self.finished.lock() {
            finished.push_back(workflow_id);
            while finished.len() > RETAINED_WORKFLOWS {
                if let Some(oldest) = finished.pop_front() {
                    self.workflows.remove(&oldest);
                }
            }
        }
    }

    async fn run_stages(
        &self,
        workflow_id: Uuid,
        req: &ProcessRequest,
        start: Instant,
    ) -> Result<WorkflowResult, EngineError> {
        let timeout = self.config.stage_timeout;
        let timeout_ms = timeout.as_millis() as u64;

        // Classifying: cache check first, heuristics only on a miss
        let hash = content_hash(&req.content);
        let (profile, cached) = match self
            .store
            .get_json::<StructuralProfile>(RecordKind::ContentAnalysis, &hash)
        {
            Some(profile) => {
                debug!(%workflow_id, "classification cache hit");
                (profile, true)
            }
            None => {
                let profile = tokio::time::timeout(timeout, async {
                    self.classifier
                        .classify(&req.content, req.url.as_deref(), &req.metadata)
                })
                .await
                .map_err(|_| EngineError::StageTimeout {
                    stage: WorkflowStage::Classifying,
                    timeout_ms,
                })?;

                self.store.put_json(
                    RecordKind::ContentAnalysis,
                    &hash,
                    &profile,
                    PutOptions {
                        confidence: Some(profile.confidence),
                        source: Some("classifier".to_string()),
                        ..Default::default()
                    },
                );
                (profile, false)
            }
        };
        self.store
            .record_pattern(profile.content_type, profile.complexity);
        self.push_message(
            workflow_id,
            WorkflowStage::Classifying,
            WorkflowStage::Selecting,
            MessageKind::Response,
            format!(
                "{}/{} cached={}",
                profile.content_type.as_str(),
                profile.complexity.as_str(),
                cached
            ),
        );

        // Selecting
        let selection = tokio::time::timeout(
            timeout,
            self.selector
                .select(&profile, &req.device, req.preferences.as_ref()),
        )
        .await
        .map_err(|_| EngineError::StageTimeout {
            stage: WorkflowStage::Selecting,
            timeout_ms,
        })?;
        self.push_message(
            workflow_id,
            WorkflowStage::Selecting,
            WorkflowStage::Validating,
            MessageKind::Response,
            format!("chose {} ({:.2})", selection.chosen.name, selection.confidence),
        );

        // Validating: re-check device fit, substituting where needed
        let final_strategy = self.validate_strategy(workflow_id, &selection, &profile, req);

        // Delegating: the one genuinely long-latency stage; cancellable
        let outcome = self
            .delegate_with_retries(workflow_id, &final_strategy, &profile, req, timeout_ms)
            .await?;
        self.push_message(
            workflow_id,
            WorkflowStage::Delegating,
            WorkflowStage::Recording,
            MessageKind::Response,
            format!("delegate {} done", self.delegate.name()),
        );

        // Recording: close the learning loop
        let confidence = compose_confidence(profile.confidence, selection.confidence);
        let latency_ms = if outcome.latency_ms > 0 {
            outcome.latency_ms
        } else {
            start.elapsed().as_millis() as u64
        };
        self.record_observation(&final_strategy, &profile, req, latency_ms, confidence, true);
        self.push_message(
            workflow_id,
            WorkflowStage::Recording,
            WorkflowStage::Completed,
            MessageKind::Notification,
            format!("recorded observation for {}", final_strategy.name),
        );

        info!(
            %workflow_id,
            strategy = final_strategy.name,
            confidence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "workflow completed"
        );

        Ok(WorkflowResult {
            workflow_id,
            content_analysis: profile,
            strategy_selection: selection,
            final_strategy,
            confidence,
            total_processing_time_ms: start.elapsed().as_millis() as u64,
            classification_cached: cached,
            messages: self.messages_for(workflow_id),
        })
    }

    /// Defense in depth: the selector already filtered on device
    /// constraints, but the coordinator re-checks the winner before
    /// handing it to the executor.
    fn validate_strategy(
        &self,
        workflow_id: Uuid,
        selection: &StrategySelection,
        profile: &StructuralProfile,
        req: &ProcessRequest,
    ) -> StrategyDescriptor {
        let chosen = &selection.chosen;

        if req.device.is_mobile && !chosen.device_optimized {
            let substitute = self.catalog.get(StrategyId::MobileOptimized).clone();
            self.push_message(
                workflow_id,
                WorkflowStage::Validating,
                WorkflowStage::Delegating,
                MessageKind::Notification,
                format!("substituted {} for {} on mobile", substitute.name, chosen.name),
            );
            return substitute;
        }

        let budget = req.device.memory_available_mb * VALIDATION_MEMORY_RATIO;
        if estimate_memory_mb(chosen, profile.word_count) > budget {
            // First compatible catalog entry in insertion order
            let substitute = self
                .catalog
                .entries()
                .iter()
                .find(|s| {
                    s.content_types.contains(&profile.content_type)
                        && s.complexity_levels.contains(&profile.complexity)
                        && estimate_memory_mb(s, profile.word_count) <= budget
                })
                .cloned();
            if let Some(substitute) = substitute {
                self.push_message(
                    workflow_id,
                    WorkflowStage::Validating,
                    WorkflowStage::Delegating,
                    MessageKind::Notification,
                    format!(
                        "substituted {} for {} over memory budget",
                        substitute.name, chosen.name
                    ),
                );
                return substitute;
            }
        }

        self.push_message(
            workflow_id,
            WorkflowStage::Validating,
            WorkflowStage::Delegating,
            MessageKind::Request,
            format!("validated {}", chosen.name),
        );
        chosen.clone()
    }

    async fn delegate_with_retries(
        &self,
        workflow_id: Uuid,
        strategy: &StrategyDescriptor,
        profile: &StructuralProfile,
        req: &ProcessRequest,
        timeout_ms: u64,
    ) -> Result<DelegateOutcome, EngineError> {
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            let call = self.delegate.execute(strategy, profile, &req.content);
            match tokio::time::timeout(self.config.stage_timeout, call).await {
                Ok(Ok(outcome)) => return Ok(outcome),
                Ok(Err(e)) => {
                    warn!(%workflow_id, attempt, error = %e, "delegate execution failed");
                    last_err = Some(EngineError::Workflow(format!(
                        "delegate execution failed: {}",
                        e
                    )));
                }
                Err(_) => {
                    warn!(%workflow_id, attempt, "delegate execution timed out");
                    last_err = Some(EngineError::StageTimeout {
                        stage: WorkflowStage::Delegating,
                        timeout_ms,
                    });
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            EngineError::Workflow("delegate failed without error detail".to_string())
        }))
    }

    /// Degrade a failed workflow into a completed low-confidence result
    fn fallback_result(
        &self,
        workflow_id: Uuid,
        req: &ProcessRequest,
        err: &EngineError,
        start: Instant,
    ) -> WorkflowResult {
        let profile = fallback_profile();
        let selection = self.selector.fallback_selection(&profile, &req.device);
        let final_strategy = selection.chosen.clone();

        self.push_message(
            workflow_id,
            err.stage(),
            WorkflowStage::Completed,
            MessageKind::Notification,
            format!("error recovered via fallback: {}", err),
        );

        self.record_observation(
            &final_strategy,
            &profile,
            req,
            start.elapsed().as_millis() as u64,
            FALLBACK_CONFIDENCE,
            false,
        );

        WorkflowResult {
            workflow_id,
            content_analysis: profile,
            strategy_selection: selection,
            final_strategy,
            confidence: FALLBACK_CONFIDENCE,
            total_processing_time_ms: start.elapsed().as_millis() as u64,
            classification_cached: false,
            messages: self.messages_for(workflow_id),
        }
    }

    fn record_observation(
        &self,
        strategy: &StrategyDescriptor,
        profile: &StructuralProfile,
        req: &ProcessRequest,
        latency_ms: u64,
        confidence: f64,
        success: bool,
    ) {
        let device_class = req.device.device_class();
        let observation = PerformanceObservation {
            strategy: strategy.name.to_string(),
            content_type: profile.content_type,
            complexity: profile.complexity,
            device_class: device_class.clone(),
            latency_ms,
            memory_mb: estimate_memory_mb(strategy, profile.word_count),
            accuracy: confidence,
            success,
        };
        let key = PerformanceObservation::history_key(
            strategy.name,
            profile.content_type,
            profile.complexity,
            &device_class,
        );
        self.store.put_json(
            RecordKind::StrategyPerformance,
            key,
            &observation,
            PutOptions {
                confidence: Some(confidence),
                source: Some("coordinator".to_string()),
                tags: vec![device_class],
                ..Default::default()
            },
        );
    }

    fn push_message(
        &self,
        workflow_id: Uuid,
        from: WorkflowStage,
        to: WorkflowStage,
        kind: MessageKind,
        payload: String,
    ) {
        let message = WorkflowMessage {
            workflow_id,
            timestamp: Utc::now(),
            from_stage: from,
            to_stage: to,
            kind,
            payload,
            priority: 5,
            timeout_ms: Some(self.config.stage_timeout.as_millis() as u64),
            retry_count: 0,
        };
        self.workflows.entry(workflow_id).or_default().push(message);
    }

    fn messages_for(&self, workflow_id: Uuid) -> Vec<WorkflowMessage> {
        self.workflows
            .get(&workflow_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    // Introspection surface: operational observability, not decision input

    /// In-flight workflows plus the retained tail of finished ones
    pub fn list_recent_workflows(&self) -> Vec<Uuid> {
        self.workflows.iter().map(|e| *e.key()).collect()
    }

    pub fn get_workflow_messages(&self, workflow_id: Uuid) -> Option<Vec<WorkflowMessage>> {
        self.workflows.get(&workflow_id).map(|m| m.clone())
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.store.stats()
    }

    pub fn store(&self) -> &SharedMemoryStore {
        &self.store
    }
}

/// Final confidence: weighted stage confidences minus a fixed
/// coordination penalty, floored at 0.1
pub fn compose_confidence(classification: f64, selection: f64) -> f64 {
    (0.6 * classification + 0.4 * selection - COORDINATION_PENALTY).max(0.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceConstraints, PerformanceEstimate, ProcessingPower};
    use std::collections::HashMap;

    #[test]
    fn test_compose_confidence() {
        let c = compose_confidence(0.8, 0.7);
        assert!((c - 0.71).abs() < 1e-9);
        // Floor applies for hopeless inputs
        assert!((compose_confidence(0.0, 0.0) - 0.1).abs() < 1e-9);
    }

    // The selector never hands a non-optimized strategy to a mobile device,
    // so the guard is exercised directly with a crafted selection.
    #[test]
    fn test_validation_guards_mobile_devices() {
        let coordinator = WorkflowCoordinator::with_defaults(EngineConfig::default());
        let chosen = coordinator.catalog.get(StrategyId::HtmlSemantic).clone();
        let selection = StrategySelection {
            chosen: chosen.clone(),
            alternatives: vec![],
            confidence: 0.8,
            estimate: PerformanceEstimate {
                expected_latency_ms: 0,
                estimated_memory_mb: 0.0,
                expected_accuracy: 0.0,
            },
            reasoning: String::new(),
        };
        let profile = fallback_profile();
        let req = ProcessRequest {
            content: String::new(),
            url: None,
            metadata: HashMap::new(),
            device: DeviceConstraints {
                is_mobile: true,
                has_internet: true,
                processing_power: ProcessingPower::Medium,
                memory_available_mb: 2048.0,
            },
            preferences: None,
        };
        let workflow_id = Uuid::new_v4();
        coordinator.workflows.insert(workflow_id, Vec::new());

        let validated = coordinator.validate_strategy(workflow_id, &selection, &profile, &req);
        assert_eq!(validated.id, StrategyId::MobileOptimized);
        assert!(validated.device_optimized);
        let messages = coordinator.get_workflow_messages(workflow_id).unwrap();
        assert!(messages
            .iter()
            .any(|m| m.kind == MessageKind::Notification && m.payload.contains("substituted")));
    }
}
