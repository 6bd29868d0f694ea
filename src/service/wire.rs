//! 依赖装配
//!
//! 注册表、清扫定时器等进程级单例在这里一次性构建并注入各层，
//! 不走环境全局量；替换存储后端只改装配，不动业务代码。

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::{Settings, StoreBackend};
use crate::domain::repository::{
    ConversationRepository, MessageRepository, UserDirectory,
};
use crate::domain::service::{MessageDispatchService, PresenceRegistry};
use crate::infrastructure::persistence::{
    InMemoryConversationRepository, InMemoryMessageRepository, InMemoryUserDirectory,
    PostgresStore,
};
use crate::infrastructure::translation::LibreTranslateGateway;
use crate::interface::ws::{ConnectionManager, PresenceBroadcast, WsMessagePush};

/// 应用上下文：全部已装配的服务
pub struct GatewayContext {
    pub settings: Settings,
    pub registry: Arc<PresenceRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub broadcast: Arc<PresenceBroadcast>,
    pub dispatch: Arc<MessageDispatchService>,
}

/// 构建应用上下文
pub async fn build_context(settings: Settings) -> Result<Arc<GatewayContext>> {
    let registry = Arc::new(PresenceRegistry::new());
    let connections = Arc::new(ConnectionManager::new());
    let broadcast = Arc::new(PresenceBroadcast::new(connections.clone(), registry.clone()));
    let push = Arc::new(WsMessagePush::new(connections.clone(), registry.clone()));

    let translator = Arc::new(LibreTranslateGateway::new(&settings.translation)?);
    translator.probe().await;

    let (messages, conversations, users): (
        Arc<dyn MessageRepository>,
        Arc<dyn ConversationRepository>,
        Arc<dyn UserDirectory>,
    ) = match settings.store.backend {
        StoreBackend::Postgres => {
            let store = PostgresStore::connect(&settings.store).await?;
            store.ensure_schema().await?;
            info!("message store backend: postgres");
            (
                Arc::new(store.messages()),
                Arc::new(store.conversations()),
                Arc::new(store.users()),
            )
        }
        StoreBackend::Memory => {
            info!("message store backend: in-memory");
            (
                Arc::new(InMemoryMessageRepository::new()),
                Arc::new(InMemoryConversationRepository::new()),
                Arc::new(InMemoryUserDirectory::new()),
            )
        }
    };

    let dispatch = Arc::new(MessageDispatchService::new(
        messages,
        conversations,
        users,
        translator,
        registry.clone(),
        push,
        settings.translation.default_source_lang.clone(),
    ));

    Ok(Arc::new(GatewayContext {
        settings,
        registry,
        connections,
        broadcast,
        dispatch,
    }))
}
