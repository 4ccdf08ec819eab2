use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use fleet_common::ids::{AgentId, ConfigId};
use serde::{Deserialize, Serialize};

use crate::{services::ServiceError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assignments))
        .route("/by-labels", post(assign_by_labels))
        .route("/batch", post(batch_assign))
        .route("/:agent_id", post(assign).delete(unassign).get(get_agent_config))
        .route("/:agent_id/status", get(get_config_status))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub config_id: ConfigId,
}

async fn assign(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<(), ServiceError> {
    state.assignment.assign_config(&AgentId::from(agent_id), &req.config_id)
}

async fn unassign(State(state): State<AppState>, Path(agent_id): Path<String>) -> Result<(), ServiceError> {
    state.assignment.unassign_config(&AgentId::from(agent_id))
}

#[derive(Debug, Deserialize)]
pub struct BatchAssignRequest {
    pub agent_ids: Vec<AgentId>,
    pub config_id: ConfigId,
}

#[derive(Debug, Serialize)]
pub struct BatchAssignResponse {
    pub successful: u32,
    pub failed: u32,
    pub failed_agent_ids: Vec<AgentId>,
}

async fn batch_assign(
    State(state): State<AppState>,
    Json(req): Json<BatchAssignRequest>,
) -> Json<BatchAssignResponse> {
    let outcome = state.assignment.batch_assign_config(&req.agent_ids, &req.config_id);
    Json(BatchAssignResponse {
        successful: outcome.successful,
        failed: outcome.failed,
        failed_agent_ids: outcome.failed_agent_ids,
    })
}

#[derive(Debug, Deserialize)]
pub struct AssignByLabelsRequest {
    pub config_id: ConfigId,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct AssignByLabelsResponse {
    pub successful: u32,
    pub failed: u32,
    pub matched_agent_ids: Vec<AgentId>,
}

async fn assign_by_labels(
    State(state): State<AppState>,
    Json(req): Json<AssignByLabelsRequest>,
) -> Result<Json<AssignByLabelsResponse>, ServiceError> {
    let outcome = state.assignment.assign_config_by_labels(&req.config_id, &req.labels)?;
    Ok(Json(AssignByLabelsResponse {
        successful: outcome.successful,
        failed: outcome.failed,
        matched_agent_ids: outcome.matched_agent_ids,
    }))
}

async fn get_agent_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<fleet_common::model::ConfigAssignment>, ServiceError> {
    Ok(Json(state.assignment.get_agent_config(&AgentId::from(agent_id))?))
}

#[derive(Debug, Deserialize)]
pub struct ListAssignmentsQuery {
    pub config_id: Option<ConfigId>,
}

async fn list_assignments(
    State(state): State<AppState>,
    Query(query): Query<ListAssignmentsQuery>,
) -> Json<Vec<fleet_common::model::ConfigAssignment>> {
    Json(state.assignment.list_config_assignments(query.config_id.as_ref()))
}

#[derive(Debug, Serialize)]
pub struct ConfigStatusResponse {
    pub assignment: fleet_common::model::ConfigAssignment,
    pub in_sync: bool,
    pub sync_status: fleet_common::model::ConfigSyncStatus,
    pub sync_reason: String,
}

async fn get_config_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<ConfigStatusResponse>, ServiceError> {
    let status = state.assignment.get_config_status(&AgentId::from(agent_id))?;
    Ok(Json(ConfigStatusResponse {
        assignment: status.assignment,
        in_sync: status.in_sync,
        sync_status: status.sync_status,
        sync_reason: status.sync_reason,
    }))
}
