use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use fleet_common::{
    ids::{AgentId, ConfigId, DeploymentId},
    model::{DeploymentState, DeploymentStatus},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    services::{
        ServiceError,
        deployment::{AgentSelector, StartDeploymentRequest},
    },
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_deployment).get(list_deployments))
        .route("/:id", get(get_deployment_status))
        .route("/:id/pause", post(pause_deployment))
        .route("/:id/resume", post(resume_deployment))
        .route("/:id/cancel", post(cancel_deployment))
}

#[derive(Debug, Deserialize)]
pub struct StartDeploymentBody {
    pub config_id: ConfigId,
    pub agent_ids: Option<Vec<AgentId>>,
    pub agent_labels: Option<HashMap<String, String>>,
    pub batch_size: u32,
    #[serde(default)]
    pub batch_delay_seconds: u64,
    #[serde(default)]
    pub max_failures: u32,
}

async fn start_deployment(
    State(state): State<AppState>,
    Json(body): Json<StartDeploymentBody>,
) -> Result<Json<DeploymentStatus>, ServiceError> {
    let agents = match (body.agent_ids, body.agent_labels) {
        (Some(ids), _) => AgentSelector::Ids(ids),
        (None, Some(labels)) => AgentSelector::Labels(labels),
        (None, None) => {
            return Err(ServiceError::InvalidArgument(
                "either agent_ids or agent_labels must be provided".into(),
            ));
        }
    };

    let status = state.deployments.start_deployment(StartDeploymentRequest {
        config_id: body.config_id,
        agents,
        batch_size: body.batch_size,
        batch_delay_seconds: body.batch_delay_seconds,
        max_failures: body.max_failures,
    })?;
    Ok(Json(status))
}

fn parse_id(raw: &str) -> Result<DeploymentId, ServiceError> {
    Uuid::parse_str(raw)
        .map(DeploymentId)
        .map_err(|_| ServiceError::InvalidArgument("invalid deployment id".into()))
}

async fn get_deployment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentStatus>, ServiceError> {
    Ok(Json(state.deployments.get_deployment_status(parse_id(&id)?)?))
}

#[derive(Debug, Deserialize)]
pub struct ListDeploymentsQuery {
    pub state: Option<DeploymentState>,
}

async fn list_deployments(
    State(state): State<AppState>,
    Query(query): Query<ListDeploymentsQuery>,
) -> Json<Vec<DeploymentStatus>> {
    Json(state.deployments.list_deployments(query.state))
}

async fn pause_deployment(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ServiceError> {
    state.deployments.pause_deployment(parse_id(&id)?)
}

async fn resume_deployment(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ServiceError> {
    state.deployments.resume_deployment(parse_id(&id)?)
}

async fn cancel_deployment(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ServiceError> {
    state.deployments.cancel_deployment(parse_id(&id)?)
}
