//! 在线状态注册表
//!
//! 进程级单例：用户ID到当前连接句柄与最后活跃时间的内存映射，
//! 由会话管理器与分发引擎共享。tokio 运行时是多线程的，
//! 事件回调可能并行执行，所以映射置于异步读写锁之后。

use std::collections::HashMap;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::model::PresenceEntry;

/// 在线状态注册表
#[derive(Default)]
pub struct PresenceRegistry {
    inner: RwLock<HashMap<String, PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记用户的当前连接：插入或覆盖，幂等
    pub async fn register(&self, user_id: &str, connection_id: &str) {
        let mut guard = self.inner.write().await;
        guard.insert(user_id.to_string(), PresenceEntry::new(connection_id));
    }

    /// 刷新活跃时间；表项不存在时为空操作
    pub async fn touch(&self, user_id: &str) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(user_id) {
            Some(entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// 查找用户当前连接句柄
    pub async fn lookup(&self, user_id: &str) -> Option<String> {
        let guard = self.inner.read().await;
        guard.get(user_id).map(|entry| entry.connection_id.clone())
    }

    /// 用户是否在线
    pub async fn is_online(&self, user_id: &str) -> bool {
        let guard = self.inner.read().await;
        guard.contains_key(user_id)
    }

    /// 反查连接句柄当前归属的用户（断开路径使用）
    pub async fn find_by_handle(&self, connection_id: &str) -> Option<String> {
        let guard = self.inner.read().await;
        guard
            .iter()
            .find(|(_, entry)| entry.connection_id == connection_id)
            .map(|(user_id, _)| user_id.clone())
    }

    /// 仅当存量句柄与给定句柄一致时移除表项
    ///
    /// 不变量：宽限期后的延迟移除不得清掉重连后的新会话
    pub async fn unregister_if_current(&self, user_id: &str, connection_id: &str) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get(user_id) {
            Some(entry) if entry.connection_id == connection_id => {
                guard.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// 当前在线用户ID列表
    pub async fn list_online(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        guard.keys().cloned().collect()
    }

    /// 清扫超过最大静默时长的表项，返回被移除的用户ID（供下游广播）
    pub async fn sweep_stale(&self, max_age: Duration) -> Vec<String> {
        let now = Utc::now();
        let mut guard = self.inner.write().await;
        let stale: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| now.signed_duration_since(entry.last_active_at) > max_age)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        for user_id in &stale {
            guard.remove(user_id);
            debug!(user_id = %user_id, "stale presence entry removed");
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_returns_most_recent_handle() {
        let registry = PresenceRegistry::new();
        registry.register("alice", "conn-1").await;
        registry.register("alice", "conn-2").await;
        // 后写入者胜出
        assert_eq!(registry.lookup("alice").await.as_deref(), Some("conn-2"));
    }

    #[tokio::test]
    async fn test_unregister_guards_against_stale_handle() {
        let registry = PresenceRegistry::new();
        registry.register("alice", "conn-1").await;
        registry.register("alice", "conn-2").await;

        // 旧连接的延迟下线不得移除重连后的表项
        assert!(!registry.unregister_if_current("alice", "conn-1").await);
        assert!(registry.is_online("alice").await);

        assert!(registry.unregister_if_current("alice", "conn-2").await);
        assert!(!registry.is_online("alice").await);
    }

    #[tokio::test]
    async fn test_touch_is_noop_for_unknown_user() {
        let registry = PresenceRegistry::new();
        assert!(!registry.touch("ghost").await);
        registry.register("alice", "conn-1").await;
        assert!(registry.touch("alice").await);
    }

    #[tokio::test]
    async fn test_find_by_handle() {
        let registry = PresenceRegistry::new();
        registry.register("alice", "conn-1").await;
        registry.register("bob", "conn-2").await;
        assert_eq!(
            registry.find_by_handle("conn-2").await.as_deref(),
            Some("bob")
        );
        assert!(registry.find_by_handle("conn-9").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_stale_removes_and_reports() {
        let registry = PresenceRegistry::new();
        registry.register("alice", "conn-1").await;
        registry.register("bob", "conn-2").await;

        // max_age 为零时所有表项都视为过期
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut removed = registry.sweep_stale(Duration::zero()).await;
        removed.sort();
        assert_eq!(removed, vec!["alice".to_string(), "bob".to_string()]);
        assert!(registry.list_online().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_stale_keeps_fresh_entries() {
        let registry = PresenceRegistry::new();
        registry.register("alice", "conn-1").await;
        let removed = registry.sweep_stale(Duration::minutes(5)).await;
        assert!(removed.is_empty());
        assert!(registry.is_online("alice").await);
    }
}
