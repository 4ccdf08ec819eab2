use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use fleet_common::{ids::ConfigId, model::Config};
use serde::Deserialize;

use crate::{services::ServiceError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_configs))
        .route("/default", get(get_default_config).put(set_default_config))
        .route("/:id", put(put_config).get(get_config).delete(delete_config))
}

#[derive(Debug, Deserialize)]
pub struct PutConfigRequest {
    pub bytes: Vec<u8>,
}

async fn put_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PutConfigRequest>,
) -> Result<Json<Config>, ServiceError> {
    Ok(Json(state.catalog.put_config(&ConfigId::from(id), req.bytes)?))
}

async fn get_config(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Config>, ServiceError> {
    Ok(Json(state.catalog.get_config(&ConfigId::from(id))?))
}

async fn delete_config(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ServiceError> {
    state.catalog.delete_config(&ConfigId::from(id))
}

async fn list_configs(State(state): State<AppState>) -> Json<Vec<Config>> {
    Json(state.catalog.list_configs())
}

async fn get_default_config(State(state): State<AppState>) -> Json<Config> {
    Json(state.catalog.get_default_config())
}

async fn set_default_config(
    State(state): State<AppState>,
    Json(req): Json<PutConfigRequest>,
) -> Result<Json<Config>, ServiceError> {
    Ok(Json(state.catalog.set_default_config(req.bytes)?))
}
