//! 实时事件线协议
//!
//! 每个 WebSocket 文本帧承载一个 JSON 对象：`{"event": <名称>, "data": <载荷>}`。
//! 事件名称为兼容既有客户端而固定。入站载荷存在历史遗留的同义字段
//! （`from`/`sender`、`to`/`receiver`、`message`/`text`/`originalText`），
//! 统一在本模块归一化为规范命令；后续各层只接触规范类型。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::commands::{AttachmentNoticeCommand, SendMessageCommand};
use crate::domain::model::{AttachmentRef, MessageDelivery, MessageKind};
use crate::error::{ChatError, ChatResult};

/// 客户端 → 服务端事件
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// 登记在线状态
    UserConnected(UserRef),
    /// 刷新活跃时间
    Heartbeat(UserRef),
    /// 发送私聊消息
    PrivateMessage(PrivateMessagePayload),
    /// 图片消息通知（附件已带外上传）
    ImageMessage(AttachmentNoticePayload),
    /// 语音消息通知
    AudioMessage(AttachmentNoticePayload),
    /// 标记会话已读
    MarkSeen(MarkSeenPayload),
}

/// 在线/心跳载荷：接受裸字符串或 `{"userId": ...}` 两种形态
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Plain(String),
    Object {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl UserRef {
    pub fn into_user_id(self) -> String {
        match self {
            UserRef::Plain(user_id) => user_id,
            UserRef::Object { user_id } => user_id,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// 私聊消息入站载荷（兼容字段别名）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessagePayload {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub client_message_id: Option<String>,
}

impl PrivateMessagePayload {
    /// 归一化为发送命令
    ///
    /// 别名取位与既有客户端一致：`from`/`to` 形态取 `message` 字段，
    /// `sender`/`receiver` 形态按 `originalText`、`text`、`message` 顺序取文本。
    /// 字段级校验（非空、会话存在）归分发引擎，这里只判定形态。
    pub fn into_command(self) -> ChatResult<SendMessageCommand> {
        let from = non_empty(self.from);
        let to = non_empty(self.to);
        let sender_alias = non_empty(self.sender);
        let receiver_alias = non_empty(self.receiver);

        let (sender, receiver, text) = if let (Some(sender), Some(receiver)) = (from, to) {
            (sender, receiver, self.message)
        } else if let (Some(sender), Some(receiver)) = (sender_alias, receiver_alias) {
            (
                sender,
                receiver,
                self.original_text.or(self.text).or(self.message),
            )
        } else {
            return Err(ChatError::InvalidMessage(
                "Invalid message format".to_string(),
            ));
        };

        Ok(SendMessageCommand {
            sender,
            receiver,
            conversation_id: self.conversation_id.unwrap_or_default(),
            text: text.unwrap_or_default(),
            client_message_id: non_empty(self.client_message_id),
        })
    }
}

/// 附件消息通知载荷
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentNoticePayload {
    /// 上传时分配的消息ID（兼容 `_id`）
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AttachmentNoticePayload {
    pub fn into_command(self, kind: MessageKind) -> ChatResult<AttachmentNoticeCommand> {
        let message_id = non_empty(self.id).ok_or_else(|| {
            ChatError::InvalidMessage("attachment notice missing message id".to_string())
        })?;
        let conversation_id = non_empty(self.conversation_id).ok_or_else(|| {
            ChatError::InvalidMessage("attachment notice missing conversationId".to_string())
        })?;
        let sender = non_empty(self.sender).ok_or_else(|| {
            ChatError::InvalidMessage("attachment notice missing sender".to_string())
        })?;
        let receiver = non_empty(self.receiver).ok_or_else(|| {
            ChatError::InvalidMessage("attachment notice missing receiver".to_string())
        })?;
        let attachment = self.attachment.ok_or_else(|| {
            ChatError::InvalidMessage("attachment notice missing attachment reference".to_string())
        })?;
        let text = non_empty(self.original_text)
            .or(non_empty(self.text))
            .unwrap_or_else(|| {
                match kind {
                    MessageKind::Image => "[Image]",
                    MessageKind::Audio => "[Audio]",
                    MessageKind::Text => "[Attachment]",
                }
                .to_string()
            });

        Ok(AttachmentNoticeCommand {
            message_id,
            conversation_id,
            sender,
            receiver,
            text,
            kind,
            attachment,
            created_at: self.created_at,
        })
    }
}

/// 标记已读载荷
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSeenPayload {
    pub conversation_id: String,
    pub user_id: String,
}

/// 服务端 → 客户端事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 握手确认
    Welcome(WelcomePayload),
    /// 全量在线快照
    OnlineUsers(Vec<String>),
    /// 上线增量
    UserOnline(String),
    /// 下线增量
    UserOffline(String),
    /// 消息投递（接收方视图或发送方多端同步视图）
    PrivateMessage(MessageDelivery),
    /// 投递回执：接收方在线
    MessageDelivered(DeliveryAck),
    /// 投递回执：接收方离线，留存待取
    MessageSent(DeliveryAck),
    /// 已读通知
    MessagesSeen(SeenNotice),
    /// 错误回执
    ErrorMessage(ErrorPayload),
}

/// 握手确认载荷
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub connection_id: String,
    pub message: String,
}

/// 投递回执载荷
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAck {
    pub message_id: String,
    pub receiver: String,
    pub timestamp: DateTime<Utc>,
}

/// 已读通知载荷
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenNotice {
    pub conversation_id: String,
    pub user_id: String,
}

/// 错误回执载荷
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_connected_accepts_both_shapes() {
        let plain: ClientEvent =
            serde_json::from_str(r#"{"event": "user_connected", "data": "alice"}"#).unwrap();
        let object: ClientEvent =
            serde_json::from_str(r#"{"event": "user_connected", "data": {"userId": "alice"}}"#)
                .unwrap();
        for event in [plain, object] {
            match event {
                ClientEvent::UserConnected(user) => {
                    assert_eq!(user.into_user_id(), "alice");
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_private_message_from_to_shape() {
        let raw = r#"{
            "event": "private_message",
            "data": {
                "from": "alice",
                "to": "bob",
                "message": "hello",
                "conversationId": "single:alice:bob"
            }
        }"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        let ClientEvent::PrivateMessage(payload) = event else {
            panic!("expected private_message");
        };
        let cmd = payload.into_command().unwrap();
        assert_eq!(cmd.sender, "alice");
        assert_eq!(cmd.receiver, "bob");
        assert_eq!(cmd.text, "hello");
        assert_eq!(cmd.conversation_id, "single:alice:bob");
    }

    #[test]
    fn test_private_message_alias_precedence() {
        let payload = PrivateMessagePayload {
            sender: Some("alice".to_string()),
            receiver: Some("bob".to_string()),
            message: Some("from message".to_string()),
            text: Some("from text".to_string()),
            original_text: Some("from originalText".to_string()),
            conversation_id: Some("c1".to_string()),
            ..PrivateMessagePayload::default()
        };
        // sender/receiver 形态优先取 originalText
        let cmd = payload.into_command().unwrap();
        assert_eq!(cmd.text, "from originalText");

        let payload = PrivateMessagePayload {
            sender: Some("alice".to_string()),
            receiver: Some("bob".to_string()),
            text: Some("from text".to_string()),
            conversation_id: Some("c1".to_string()),
            ..PrivateMessagePayload::default()
        };
        assert_eq!(payload.into_command().unwrap().text, "from text");
    }

    #[test]
    fn test_private_message_without_alias_pair_is_rejected() {
        let payload = PrivateMessagePayload {
            message: Some("hello".to_string()),
            ..PrivateMessagePayload::default()
        };
        assert!(matches!(
            payload.into_command(),
            Err(ChatError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_private_message_empty_fields_pass_through() {
        // 空文本/空会话ID由分发引擎校验后拒绝，这里只保证形态归一
        let payload = PrivateMessagePayload {
            from: Some("alice".to_string()),
            to: Some("bob".to_string()),
            ..PrivateMessagePayload::default()
        };
        let cmd = payload.into_command().unwrap();
        assert!(cmd.text.is_empty());
        assert!(cmd.conversation_id.is_empty());
    }

    #[test]
    fn test_attachment_notice_accepts_mongo_style_id() {
        let raw = r#"{
            "event": "image_message",
            "data": {
                "_id": "msg-1",
                "conversationId": "single:alice:bob",
                "sender": "alice",
                "receiver": "bob",
                "attachment": {"id": "blob-1", "filename": "a.png", "contentType": "image/png"}
            }
        }"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        let ClientEvent::ImageMessage(payload) = event else {
            panic!("expected image_message");
        };
        let cmd = payload.into_command(MessageKind::Image).unwrap();
        assert_eq!(cmd.message_id, "msg-1");
        assert_eq!(cmd.text, "[Image]");
        assert_eq!(cmd.attachment.content_type, "image/png");
    }

    #[test]
    fn test_attachment_notice_requires_attachment() {
        let payload = AttachmentNoticePayload {
            id: Some("msg-1".to_string()),
            conversation_id: Some("c1".to_string()),
            sender: Some("alice".to_string()),
            receiver: Some("bob".to_string()),
            ..AttachmentNoticePayload::default()
        };
        assert!(payload.into_command(MessageKind::Audio).is_err());
    }

    #[test]
    fn test_mark_seen_payload() {
        let raw = r#"{"event": "mark_seen", "data": {"conversationId": "c1", "userId": "bob"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        let ClientEvent::MarkSeen(payload) = event else {
            panic!("expected mark_seen");
        };
        assert_eq!(payload.conversation_id, "c1");
        assert_eq!(payload.user_id, "bob");
    }

    #[test]
    fn test_unknown_event_fails_to_parse() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event": "typing", "data": "alice"}"#)
            .is_err());
        assert!(serde_json::from_str::<ClientEvent>("not even json").is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let ack = ServerEvent::MessageDelivered(DeliveryAck {
            message_id: "m1".to_string(),
            receiver: "bob".to_string(),
            timestamp: Utc::now(),
        });
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["event"], "message_delivered");
        assert_eq!(value["data"]["messageId"], "m1");
        assert_eq!(value["data"]["receiver"], "bob");

        let online = ServerEvent::OnlineUsers(vec!["alice".to_string()]);
        let value = serde_json::to_value(&online).unwrap();
        assert_eq!(value["event"], "online_users");
        assert_eq!(value["data"][0], "alice");

        let seen = ServerEvent::MessagesSeen(SeenNotice {
            conversation_id: "c1".to_string(),
            user_id: "bob".to_string(),
        });
        let value = serde_json::to_value(&seen).unwrap();
        assert_eq!(value["event"], "messages_seen");
        assert_eq!(value["data"]["conversationId"], "c1");
        assert_eq!(value["data"]["userId"], "bob");
    }
}
