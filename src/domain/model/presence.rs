//! 在线状态表项

use chrono::{DateTime, Utc};

/// 在线状态表项（以用户ID为键存于注册表）
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    /// 当前连接句柄
    pub connection_id: String,
    /// 最后活跃时间
    pub last_active_at: DateTime<Utc>,
}

impl PresenceEntry {
    pub fn new(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            last_active_at: Utc::now(),
        }
    }

    /// 刷新活跃时间
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}
