use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use fleet_common::{ids::ConfigId, model::BootstrapToken};
use serde::Deserialize;

use crate::{services::ServiceError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_token).get(list_tokens))
        .route("/signatures", get(signatures))
        .route("/:id", delete(delete_token))
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub ttl_seconds: i64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub config_reference: Option<ConfigId>,
}

async fn create_token(
    State(state): State<AppState>,
    Json(req): Json<CreateTokenRequest>,
) -> Result<Json<BootstrapToken>, ServiceError> {
    let token = state
        .tokens
        .create_token(req.ttl_seconds, req.labels, req.config_reference)?;
    Ok(Json(token))
}

async fn list_tokens(State(state): State<AppState>) -> Json<Vec<BootstrapToken>> {
    Json(state.tokens.list_tokens())
}

async fn delete_token(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ServiceError> {
    state.tokens.delete_token(&id.into())
}

async fn signatures(State(state): State<AppState>) -> Result<Json<HashMap<String, String>>, ServiceError> {
    Ok(Json(state.tokens.signatures()?))
}
