//! 规范化命令类型
//!
//! 线协议的历史载荷存在同义字段别名，统一在接入边界归一化为
//! 这里的命令类型；分发引擎只接受规范形态。

use chrono::{DateTime, Utc};

use crate::domain::model::{AttachmentRef, MessageKind};

/// 发送私聊消息
#[derive(Debug, Clone)]
pub struct SendMessageCommand {
    pub sender: String,
    pub receiver: String,
    pub conversation_id: String,
    pub text: String,
    /// 客户端关联ID：接收端用于多路径投递去重
    pub client_message_id: Option<String>,
}

/// 标记会话已读
#[derive(Debug, Clone)]
pub struct MarkSeenCommand {
    pub conversation_id: String,
    pub user_id: String,
}

/// 附件消息通知
///
/// 附件经带外HTTP上传并已落库，这里只携带已持久化的记录用于实时转发
#[derive(Debug, Clone)]
pub struct AttachmentNoticeCommand {
    /// 上传时分配的消息ID
    pub message_id: String,
    pub conversation_id: String,
    pub sender: String,
    pub receiver: String,
    /// 占位文本（如 "[Image]"）
    pub text: String,
    pub kind: MessageKind,
    pub attachment: AttachmentRef,
    pub created_at: Option<DateTime<Utc>>,
}
