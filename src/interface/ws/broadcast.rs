//! 在线状态广播
//!
//! 上线/下线增量与全量在线快照的推送，以及供非实时协作方
//! （健康检查、REST 查询）使用的在线查询口。

use std::sync::Arc;

use crate::domain::service::PresenceRegistry;
use crate::interface::ws::connection::ConnectionManager;
use crate::interface::ws::events::ServerEvent;

/// 在线状态广播器
pub struct PresenceBroadcast {
    manager: Arc<ConnectionManager>,
    registry: Arc<PresenceRegistry>,
}

impl PresenceBroadcast {
    pub fn new(manager: Arc<ConnectionManager>, registry: Arc<PresenceRegistry>) -> Self {
        Self { manager, registry }
    }

    /// 向全部连接推送当前在线快照
    pub async fn broadcast_online_list(&self) {
        let online = self.registry.list_online().await;
        self.manager.broadcast_all(&ServerEvent::OnlineUsers(online));
    }

    /// 向指定连接推送当前在线快照（登记完成时）
    pub async fn send_online_list_to(&self, connection_id: &str) {
        let online = self.registry.list_online().await;
        self.manager
            .send_to_connection(connection_id, &ServerEvent::OnlineUsers(online));
    }

    /// 向除本端外的全部连接广播用户上线
    pub fn broadcast_user_online(&self, user_id: &str, except_connection_id: &str) {
        self.manager.broadcast_except(
            except_connection_id,
            &ServerEvent::UserOnline(user_id.to_string()),
        );
    }

    /// 广播用户下线（此时该用户已无存活连接）
    pub fn broadcast_user_offline(&self, user_id: &str) {
        self.manager
            .broadcast_all(&ServerEvent::UserOffline(user_id.to_string()));
    }

    /// 当前在线用户查询口
    pub async fn get_online_users(&self) -> Vec<String> {
        self.registry.list_online().await
    }
}
