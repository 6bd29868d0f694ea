//! 实时投递端口适配
//!
//! 分发引擎的投递出口：直连句柄 + 用户广播组双路径（至少一次语义，
//! 去重由消费端按 clientMessageId 处理）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::model::MessageDelivery;
use crate::domain::repository::MessagePush;
use crate::domain::service::PresenceRegistry;
use crate::error::ChatResult;
use crate::interface::ws::connection::ConnectionManager;
use crate::interface::ws::events::{SeenNotice, ServerEvent};

/// WebSocket 投递端口
pub struct WsMessagePush {
    manager: Arc<ConnectionManager>,
    registry: Arc<PresenceRegistry>,
}

impl WsMessagePush {
    pub fn new(manager: Arc<ConnectionManager>, registry: Arc<PresenceRegistry>) -> Self {
        Self { manager, registry }
    }
}

#[async_trait]
impl MessagePush for WsMessagePush {
    async fn push_message(&self, user_id: &str, delivery: &MessageDelivery) -> ChatResult<bool> {
        let event = ServerEvent::PrivateMessage(delivery.clone());
        let mut hit = false;
        // 注册表读数可能在挂起后过时，句柄失效时仅发送失败，不报错
        if let Some(connection_id) = self.registry.lookup(user_id).await {
            hit |= self.manager.send_to_connection(&connection_id, &event);
        }
        hit |= self.manager.send_to_group(user_id, &event);
        Ok(hit)
    }

    async fn push_messages_seen(
        &self,
        user_id: &str,
        conversation_id: &str,
        seen_by: &str,
    ) -> ChatResult<bool> {
        let event = ServerEvent::MessagesSeen(SeenNotice {
            conversation_id: conversation_id.to_string(),
            user_id: seen_by.to_string(),
        });
        Ok(self.manager.send_to_group(user_id, &event))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::model::MessageKind;

    fn delivery() -> MessageDelivery {
        MessageDelivery {
            id: "m1".to_string(),
            conversation_id: "single:alice:bob".to_string(),
            sender: "alice".to_string(),
            receiver: "bob".to_string(),
            text: "नमस्ते".to_string(),
            original_text: "hello".to_string(),
            kind: MessageKind::Text,
            attachment: None,
            client_message_id: Some("c1".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_push_hits_direct_handle_and_group() {
        let manager = Arc::new(ConnectionManager::new());
        let registry = Arc::new(PresenceRegistry::new());
        let push = WsMessagePush::new(manager.clone(), registry.clone());

        let (direct_tx, mut direct_rx) = mpsc::unbounded_channel();
        let (tab_tx, mut tab_rx) = mpsc::unbounded_channel();
        manager.insert("conn-1", direct_tx.clone());
        manager.join_group("bob", "conn-1", direct_tx);
        manager.join_group("bob", "conn-2", tab_tx);
        registry.register("bob", "conn-1").await;

        assert!(push.push_message("bob", &delivery()).await.unwrap());

        // 直连句柄与广播组都命中：主连接收到两份（由客户端按 clientMessageId 去重）
        assert!(direct_rx.try_recv().is_ok());
        assert!(direct_rx.try_recv().is_ok());
        assert!(tab_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_push_misses_offline_user() {
        let manager = Arc::new(ConnectionManager::new());
        let registry = Arc::new(PresenceRegistry::new());
        let push = WsMessagePush::new(manager, registry);
        assert!(!push.push_message("bob", &delivery()).await.unwrap());
    }

    #[tokio::test]
    async fn test_push_tolerates_stale_registry_handle() {
        let manager = Arc::new(ConnectionManager::new());
        let registry = Arc::new(PresenceRegistry::new());
        let push = WsMessagePush::new(manager.clone(), registry.clone());

        // 注册表句柄指向已消失的连接（挂起点之间断开）
        registry.register("bob", "conn-gone").await;
        let (tab_tx, mut tab_rx) = mpsc::unbounded_channel();
        manager.join_group("bob", "conn-2", tab_tx);

        // 直连失败但广播组命中
        assert!(push.push_message("bob", &delivery()).await.unwrap());
        assert!(tab_rx.try_recv().is_ok());
    }
}
