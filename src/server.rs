//! HTTP surface for the strategy engine

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info};
use uuid::Uuid;

use crate::types::{
    DeviceConstraints, MemoryStats, ProcessRequest, UserPreferences, WorkflowMessage,
    WorkflowResult,
};
use crate::workflow::SharedCoordinator;

/// Process request body
#[derive(Debug, Deserialize)]
pub struct ProcessRequestHttp {
    pub content: String,
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub device: DeviceConstraints,
    pub preferences: Option<UserPreferences>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct WorkflowListResponse {
    pub workflows: Vec<Uuid>,
}

async fn process_handler(
    State(coordinator): State<SharedCoordinator>,
    Json(req): Json<ProcessRequestHttp>,
) -> Result<Json<WorkflowResult>, (StatusCode, Json<ErrorResponse>)> {
    info!(
        content_bytes = req.content.len(),
        device = %req.device.device_class(),
        "received process request"
    );

    let request = ProcessRequest {
        content: req.content,
        url: req.url,
        metadata: req.metadata,
        device: req.device,
        preferences: req.preferences,
    };

    match coordinator.process(request).await {
        Ok(result) => {
            info!(
                workflow_id = %result.workflow_id,
                strategy = result.final_strategy.name,
                confidence = result.confidence,
                "workflow succeeded"
            );
            Ok(Json(result))
        }
        Err(e) => {
            error!("workflow failed: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "workflow failed".to_string(),
                    details: Some(e.to_string()),
                }),
            ))
        }
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "stratagen".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_workflows_handler(
    State(coordinator): State<SharedCoordinator>,
) -> Json<WorkflowListResponse> {
    Json(WorkflowListResponse {
        workflows: coordinator.list_recent_workflows(),
    })
}

async fn workflow_messages_handler(
    State(coordinator): State<SharedCoordinator>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WorkflowMessage>>, (StatusCode, Json<ErrorResponse>)> {
    coordinator.get_workflow_messages(id).map(Json).ok_or((
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "unknown workflow".to_string(),
            details: Some(id.to_string()),
        }),
    ))
}

async fn memory_stats_handler(State(coordinator): State<SharedCoordinator>) -> Json<MemoryStats> {
    Json(coordinator.memory_stats())
}

/// Create and configure the HTTP router
pub fn create_router(coordinator: SharedCoordinator) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/process", post(process_handler))
        .route("/workflows", get(list_workflows_handler))
        .route("/workflows/:id/messages", get(workflow_messages_handler))
        .route("/memory/stats", get(memory_stats_handler))
        .with_state(coordinator)
}

/// Run the HTTP server
pub async fn run_server(coordinator: SharedCoordinator, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("starting stratagen server on {}", addr);

    let app = create_router(coordinator);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
