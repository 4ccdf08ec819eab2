use std::net::SocketAddr;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{api, opamp::websocket::agent_ws_handler, state::AppState};

pub async fn start(state: AppState, bind: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/agent", get(agent_ws_handler))
        .nest("/api/v1", api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
