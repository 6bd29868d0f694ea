//! 接入服务路由
//!
//! 同一监听端口上提供 WebSocket 升级入口与只读查询端点。

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::interface::ws::connection::handle_socket;
use crate::service::wire::GatewayContext;

/// 构建接入路由
pub fn router(ctx: Arc<GatewayContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", any(ws_handler))
        .route("/online", get(online_users))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

async fn ws_handler(
    State(ctx): State<Arc<GatewayContext>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

/// 在线用户查询（非实时协作方使用）
#[derive(Debug, Serialize)]
struct OnlineUsersResponse {
    online: Vec<String>,
}

async fn online_users(State(ctx): State<Arc<GatewayContext>>) -> Json<OnlineUsersResponse> {
    Json(OnlineUsersResponse {
        online: ctx.broadcast.get_online_users().await,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

async fn healthz(State(ctx): State<Arc<GatewayContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: ctx.connections.connection_count(),
    })
}
