//! 连接生命周期管理
//!
//! 连接表、按用户的广播组，以及单个 WebSocket 连接的事件循环。
//! 每连接状态机：匿名连接 → 登记用户 → 断开。断开后经宽限期
//! 再判定下线，吸收页签刷新等快速重连。

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::commands::MarkSeenCommand;
use crate::domain::model::MessageKind;
use crate::domain::service::PresenceRegistry;
use crate::error::ChatError;
use crate::interface::ws::broadcast::PresenceBroadcast;
use crate::interface::ws::events::{
    AttachmentNoticePayload, ClientEvent, DeliveryAck, ErrorPayload, ServerEvent, WelcomePayload,
};
use crate::service::wire::GatewayContext;

/// 连接出站通道
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// 连接表与按用户的广播组
///
/// 广播组允许同一用户的多个通道（多页签/多设备）同时收到投递；
/// 发送走 mpsc 通道，句柄失效时静默失败，不影响其他连接。
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<String, EventSender>,
    groups: DashMap<String, Vec<(String, EventSender)>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection_id: &str, sender: EventSender) {
        self.connections.insert(connection_id.to_string(), sender);
    }

    pub fn remove(&self, connection_id: &str) {
        self.connections.remove(connection_id);
    }

    /// 将连接加入用户广播组
    pub fn join_group(&self, user_id: &str, connection_id: &str, sender: EventSender) {
        let mut group = self.groups.entry(user_id.to_string()).or_default();
        group.retain(|(existing, _)| existing != connection_id);
        group.push((connection_id.to_string(), sender));
    }

    /// 将连接移出用户广播组；空组即删除
    pub fn leave_group(&self, user_id: &str, connection_id: &str) {
        if let Some(mut group) = self.groups.get_mut(user_id) {
            group.retain(|(existing, _)| existing != connection_id);
            if group.is_empty() {
                drop(group);
                self.groups.remove(user_id);
            }
        }
    }

    /// 发送到指定连接；句柄已失效时返回 false
    pub fn send_to_connection(&self, connection_id: &str, event: &ServerEvent) -> bool {
        match self.connections.get(connection_id) {
            Some(sender) => sender.send(event.clone()).is_ok(),
            None => false,
        }
    }

    /// 发送到用户广播组，任一通道送达即视为命中
    pub fn send_to_group(&self, user_id: &str, event: &ServerEvent) -> bool {
        let mut hit = false;
        if let Some(group) = self.groups.get(user_id) {
            for (_, sender) in group.iter() {
                hit |= sender.send(event.clone()).is_ok();
            }
        }
        hit
    }

    /// 发送到用户广播组，排除指定连接（多端同步时跳过发起端）
    pub fn send_to_group_except(
        &self,
        user_id: &str,
        except_connection_id: &str,
        event: &ServerEvent,
    ) {
        if let Some(group) = self.groups.get(user_id) {
            for (connection_id, sender) in group.iter() {
                if connection_id != except_connection_id {
                    let _ = sender.send(event.clone());
                }
            }
        }
    }

    /// 广播到全部连接
    pub fn broadcast_all(&self, event: &ServerEvent) {
        for entry in self.connections.iter() {
            let _ = entry.value().send(event.clone());
        }
    }

    /// 广播到除指定连接外的全部连接
    pub fn broadcast_except(&self, except_connection_id: &str, event: &ServerEvent) {
        for entry in self.connections.iter() {
            if entry.key() != except_connection_id {
                let _ = entry.value().send(event.clone());
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// 断线宽限：延迟下线判定，期间重连则放弃
///
/// 到期只在存量句柄仍是断开句柄时移除表项并广播下线；
/// 重连会覆盖句柄，使本次判定落空。
pub fn schedule_offline(
    registry: Arc<PresenceRegistry>,
    broadcast: Arc<PresenceBroadcast>,
    user_id: String,
    connection_id: String,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        if registry.unregister_if_current(&user_id, &connection_id).await {
            info!(user_id = %user_id, "user offline after grace period");
            broadcast.broadcast_online_list().await;
            broadcast.broadcast_user_offline(&user_id);
        } else {
            debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "offline check skipped, user reconnected within grace period"
            );
        }
    })
}

/// 单个 WebSocket 连接的事件循环
pub async fn handle_socket(socket: WebSocket, ctx: Arc<GatewayContext>) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // 写端任务：逐事件序列化下发，传输关闭即退出
    let writer_connection_id = connection_id.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                debug!(connection_id = %writer_connection_id, "outbound channel closed");
                break;
            }
        }
    });

    ctx.connections.insert(&connection_id, tx.clone());
    let _ = tx.send(ServerEvent::Welcome(WelcomePayload {
        connection_id: connection_id.clone(),
        message: "Connected to chat server".to_string(),
    }));
    info!(connection_id = %connection_id, "connection established");

    // 当前连接上已登记的用户（匿名期为 None）
    let mut registered_user: Option<String> = None;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                handle_event(&ctx, &connection_id, &tx, &mut registered_user, text.as_str()).await;
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(connection_id = %connection_id, error = %err, "socket error");
                let _ = tx.send(ServerEvent::ErrorMessage(ErrorPayload {
                    error: "Socket error occurred".to_string(),
                }));
                break;
            }
        }
    }

    // 断开：立刻回收连接表与广播组，下线判定交给宽限期
    ctx.connections.remove(&connection_id);
    if let Some(user_id) = registered_user {
        ctx.connections.leave_group(&user_id, &connection_id);
    }
    if let Some(user_id) = ctx.registry.find_by_handle(&connection_id).await {
        let _ = schedule_offline(
            ctx.registry.clone(),
            ctx.broadcast.clone(),
            user_id,
            connection_id.clone(),
            ctx.settings.presence.grace_period(),
        );
    }
    info!(connection_id = %connection_id, "connection closed");
}

/// 处理一个入站事件
///
/// 畸形载荷只记录并丢弃，单个事件的失败不影响连接本身，
/// 更不影响其他连接。
async fn handle_event(
    ctx: &Arc<GatewayContext>,
    connection_id: &str,
    tx: &EventSender,
    registered_user: &mut Option<String>,
    raw: &str,
) {
    let event: ClientEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(err) => {
            warn!(connection_id = %connection_id, error = %err, "dropping malformed event");
            return;
        }
    };

    match event {
        ClientEvent::UserConnected(user) => {
            let user_id = user.into_user_id();
            if user_id.is_empty() {
                // 刻意宽容：无用户ID的登记保持匿名，不算错误
                debug!(connection_id = %connection_id, "user_connected without user id, staying anonymous");
                return;
            }
            ctx.registry.register(&user_id, connection_id).await;
            ctx.connections.join_group(&user_id, connection_id, tx.clone());
            *registered_user = Some(user_id.clone());
            ctx.broadcast.send_online_list_to(connection_id).await;
            ctx.broadcast.broadcast_user_online(&user_id, connection_id);
            info!(user_id = %user_id, connection_id = %connection_id, "user registered");
        }
        ClientEvent::Heartbeat(user) => {
            let user_id = user.into_user_id();
            if !user_id.is_empty() {
                ctx.registry.touch(&user_id).await;
            }
        }
        ClientEvent::PrivateMessage(payload) => {
            let cmd = match payload.into_command() {
                Ok(cmd) => cmd,
                Err(err) => {
                    warn!(connection_id = %connection_id, error = %err, "rejected message payload");
                    let _ = tx.send(ServerEvent::ErrorMessage(ErrorPayload {
                        error: err.to_string(),
                    }));
                    return;
                }
            };
            match ctx.dispatch.dispatch(cmd).await {
                Ok(outcome) => {
                    // 发送方其他设备同步原文视图
                    ctx.connections.send_to_group_except(
                        &outcome.message.sender,
                        connection_id,
                        &ServerEvent::PrivateMessage(outcome.sender_view.clone()),
                    );
                    let ack = DeliveryAck {
                        message_id: outcome.message.id.clone(),
                        receiver: outcome.message.receiver.clone(),
                        timestamp: outcome.message.created_at,
                    };
                    let _ = tx.send(if outcome.delivered_live {
                        ServerEvent::MessageDelivered(ack)
                    } else {
                        ServerEvent::MessageSent(ack)
                    });
                }
                Err(err) if err.is_client_fault() => {
                    warn!(connection_id = %connection_id, error = %err, "rejected message");
                    let _ = tx.send(ServerEvent::ErrorMessage(ErrorPayload {
                        error: err.to_string(),
                    }));
                }
                Err(err) => {
                    error!(connection_id = %connection_id, error = %err, "message dispatch failed");
                    let _ = tx.send(ServerEvent::ErrorMessage(ErrorPayload {
                        error: "Server error processing message".to_string(),
                    }));
                }
            }
        }
        ClientEvent::ImageMessage(payload) => {
            forward_attachment(ctx, connection_id, tx, payload, MessageKind::Image).await;
        }
        ClientEvent::AudioMessage(payload) => {
            forward_attachment(ctx, connection_id, tx, payload, MessageKind::Audio).await;
        }
        ClientEvent::MarkSeen(payload) => {
            let result = ctx
                .dispatch
                .mark_seen(MarkSeenCommand {
                    conversation_id: payload.conversation_id,
                    user_id: payload.user_id,
                })
                .await;
            if let Err(err) = result {
                // 已读回执尽力而为，失败不回执不上抛
                debug!(connection_id = %connection_id, error = %err, "mark_seen ignored");
            }
        }
    }
}

async fn forward_attachment(
    ctx: &Arc<GatewayContext>,
    connection_id: &str,
    tx: &EventSender,
    payload: AttachmentNoticePayload,
    kind: MessageKind,
) {
    let cmd = match payload.into_command(kind) {
        Ok(cmd) => cmd,
        Err(err) => {
            warn!(connection_id = %connection_id, error = %err, "dropping attachment notice");
            return;
        }
    };
    match ctx.dispatch.forward_attachment(cmd).await {
        Ok((delivery, _)) => {
            // 发送方即时回显
            let _ = tx.send(ServerEvent::PrivateMessage(delivery));
        }
        Err(err) => match err {
            ChatError::InvalidMessage(_) => {
                warn!(connection_id = %connection_id, error = %err, "invalid attachment notice");
            }
            other => {
                error!(connection_id = %connection_id, error = %other, "attachment forward failed");
            }
        },
    }
}
