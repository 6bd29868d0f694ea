//! 消息领域模型
//!
//! 消息一经持久化即不可变，唯一允许的状态变更是 `seen` 置位（批量，由接收方触发）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// 消息类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// 文本消息
    #[default]
    Text,
    /// 图片消息（附件引用）
    Image,
    /// 语音消息（附件引用）
    Audio,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
        }
    }

    /// 从存储字段解析；未知值回退为文本
    pub fn parse(value: &str) -> Self {
        match value {
            "image" => MessageKind::Image,
            "audio" => MessageKind::Audio,
            _ => MessageKind::Text,
        }
    }
}

/// 附件引用
///
/// 图片/语音内容经带外上传落入对象存储，消息只携带不透明引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    /// 附件ID（对象存储侧的不透明标识）
    pub id: String,
    /// 文件名
    pub filename: String,
    /// MIME 类型
    pub content_type: String,
}

/// 待持久化的新消息
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender: String,
    pub receiver: String,
    pub original_text: String,
    pub translated_text: Option<String>,
    pub original_language: String,
    pub translated_language: Option<String>,
    pub kind: MessageKind,
    pub attachment: Option<AttachmentRef>,
}

/// 已持久化的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// 消息ID（ULID，按创建时间可排序）
    pub id: String,
    pub conversation_id: String,
    pub sender: String,
    pub receiver: String,
    pub original_text: String,
    pub translated_text: Option<String>,
    pub original_language: String,
    pub translated_language: Option<String>,
    pub kind: MessageKind,
    pub attachment: Option<AttachmentRef>,
    pub created_at: DateTime<Utc>,
    pub seen: bool,
}

impl Message {
    /// 由新消息生成持久化记录：分配消息ID与创建时间，seen 初始为 false
    pub fn from_new(new: NewMessage) -> Self {
        Self {
            id: Ulid::new().to_string(),
            conversation_id: new.conversation_id,
            sender: new.sender,
            receiver: new.receiver,
            original_text: new.original_text,
            translated_text: new.translated_text,
            original_language: new.original_language,
            translated_language: new.translated_language,
            kind: new.kind,
            attachment: new.attachment,
            created_at: Utc::now(),
            seen: false,
        }
    }
}

/// 消息投递视图
///
/// 接收方视图的 `text` 携带译文；发送方视图的 `text` 携带原文
/// （仅用于本地回显与多端同步）。`originalText` 两侧一致。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelivery {
    pub id: String,
    pub conversation_id: String,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub original_text: String,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageDelivery {
    /// 接收方视图：text 为译文（翻译缺席时等于原文）
    pub fn receiver_view(message: &Message, client_message_id: Option<String>) -> Self {
        let text = message
            .translated_text
            .clone()
            .unwrap_or_else(|| message.original_text.clone());
        Self {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            text,
            original_text: message.original_text.clone(),
            kind: message.kind,
            attachment: message.attachment.clone(),
            client_message_id,
            created_at: message.created_at,
        }
    }

    /// 发送方视图：text 为原文
    pub fn sender_view(message: &Message, client_message_id: Option<String>) -> Self {
        Self {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            text: message.original_text.clone(),
            original_text: message.original_text.clone(),
            kind: message.kind,
            attachment: message.attachment.clone(),
            client_message_id,
            created_at: message.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        Message::from_new(NewMessage {
            conversation_id: "single:a:b".to_string(),
            sender: "a".to_string(),
            receiver: "b".to_string(),
            original_text: "hello".to_string(),
            translated_text: Some("नमस्ते".to_string()),
            original_language: "en".to_string(),
            translated_language: Some("hi".to_string()),
            kind: MessageKind::Text,
            attachment: None,
        })
    }

    #[test]
    fn test_from_new_defaults() {
        let message = sample_message();
        assert!(!message.seen);
        assert!(!message.id.is_empty());
    }

    #[test]
    fn test_delivery_views() {
        let message = sample_message();
        let receiver = MessageDelivery::receiver_view(&message, Some("c1".to_string()));
        assert_eq!(receiver.text, "नमस्ते");
        assert_eq!(receiver.original_text, "hello");
        assert_eq!(receiver.client_message_id.as_deref(), Some("c1"));

        let sender = MessageDelivery::sender_view(&message, None);
        assert_eq!(sender.text, "hello");
    }

    #[test]
    fn test_receiver_view_without_translation() {
        let mut message = sample_message();
        message.translated_text = None;
        let receiver = MessageDelivery::receiver_view(&message, None);
        assert_eq!(receiver.text, "hello");
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        assert_eq!(MessageKind::parse("image"), MessageKind::Image);
        assert_eq!(MessageKind::parse("audio"), MessageKind::Audio);
        assert_eq!(MessageKind::parse("unknown"), MessageKind::Text);
        assert_eq!(MessageKind::Image.as_str(), "image");
    }
}
