use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use fleet_common::{ids::AgentId, model::{Agent, ConnectionState}};

use crate::{services::ServiceError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_agents))
        .route("/:id", get(get_agent))
        .route("/:id/status", get(get_agent_status))
}

async fn list_agents(State(state): State<AppState>) -> Json<Vec<Agent>> {
    Json(state.repository.list())
}

async fn get_agent(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Agent>, ServiceError> {
    state
        .repository
        .get(&AgentId::from(id))
        .map(Json)
        .map_err(ServiceError::from_storage)
}

async fn get_agent_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionState>, ServiceError> {
    state
        .repository
        .get_connection_state(&AgentId::from(id))
        .map(Json)
        .map_err(ServiceError::from_storage)
}
