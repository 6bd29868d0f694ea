//! 服务启动
//!
//! 监听接入端口、启动僵尸连接清扫任务，并在收到停止信号时优雅退出。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Settings;
use crate::interface::ws::server;
use crate::service::wire::{self, GatewayContext};

/// 启动服务主入口
pub async fn run(settings: Settings) -> Result<()> {
    let ctx = wire::build_context(settings).await?;

    let _sweeper = spawn_presence_sweeper(ctx.clone());

    let addr: SocketAddr = ctx
        .settings
        .server
        .bind_addr()
        .parse()
        .context("invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind server address")?;
    info!(
        address = %addr,
        grace_period_secs = ctx.settings.presence.grace_period_secs,
        sweep_interval_secs = ctx.settings.presence.sweep_interval_secs,
        "babel-im-core listening"
    );

    axum::serve(listener, server::router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

/// 周期清扫：回收网络分区或进程崩溃遗留的僵尸在线表项
///
/// 独立于显式断开路径，每个被移除的用户触发一次在线快照刷新
fn spawn_presence_sweeper(ctx: Arc<GatewayContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ctx.settings.presence.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = ctx
                .registry
                .sweep_stale(ctx.settings.presence.max_idle())
                .await;
            if removed.is_empty() {
                continue;
            }
            info!(count = removed.len(), users = ?removed, "swept stale presence entries");
            ctx.broadcast.broadcast_online_list().await;
        }
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
