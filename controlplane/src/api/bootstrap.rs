use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::{services::ServiceError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(bootstrap))
}

#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    pub client_id: String,
    pub name: String,
    #[serde(with = "hex_bytes")]
    pub client_pub_key: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    #[serde(with = "hex_bytes")]
    pub server_pub_key: Vec<u8>,
}

async fn bootstrap(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BootstrapRequest>,
) -> Result<Json<BootstrapResponse>, ServiceError> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let outcome = state
        .bootstrap
        .bootstrap(&req.client_id, &req.name, &req.client_pub_key, bearer)?;
    Ok(Json(BootstrapResponse {
        server_pub_key: outcome.server_pub_key,
    }))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let s: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(serde::de::Error::custom))
            .collect()
    }
}
