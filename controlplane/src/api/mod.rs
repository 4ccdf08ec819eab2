mod agents;
mod assignments;
mod bootstrap;
mod configs;
mod deployments;
pub mod error;
mod tokens;

use axum::Router;

use crate::state::AppState;

/// Request-validating facade over C4-C9 (C10). Each resource group gets its
/// own module and is nested under its own path, mirroring the teacher's
/// per-resource `server/api.rs` handler grouping.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/tokens", tokens::routes())
        .nest("/bootstrap", bootstrap::routes())
        .nest("/configs", configs::routes())
        .nest("/assignments", assignments::routes())
        .nest("/agents", agents::routes())
        .nest("/deployments", deployments::routes())
}
