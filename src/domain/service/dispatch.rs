//! 消息分发引擎
//!
//! 一条出站消息的端到端处理：校验、接收方语言解析、翻译（可降级）、
//! 持久化、在线投递与发送方回执定性。持久化先于投递与回执，
//! 客户端重载后看到的至少是已投递过的内容。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::application::commands::{AttachmentNoticeCommand, MarkSeenCommand, SendMessageCommand};
use crate::domain::model::{Message, MessageDelivery, MessageKind, NewMessage};
use crate::domain::repository::{
    ConversationRepository, MessagePush, MessageRepository, TranslationGateway, UserDirectory,
};
use crate::domain::service::PresenceRegistry;
use crate::error::{ChatError, ChatResult};

/// 一次分发的结果（供接入层生成回执与多端同步）
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// 已持久化的消息
    pub message: Message,
    /// 是否命中接收方在线连接（true => delivered，false => sent）
    pub delivered_live: bool,
    /// 发送方视图（原文），用于发送方其他设备同步
    pub sender_view: MessageDelivery,
}

/// 消息分发引擎
pub struct MessageDispatchService {
    messages: Arc<dyn MessageRepository>,
    conversations: Arc<dyn ConversationRepository>,
    users: Arc<dyn UserDirectory>,
    translator: Arc<dyn TranslationGateway>,
    registry: Arc<PresenceRegistry>,
    push: Arc<dyn MessagePush>,
    default_source_lang: String,
}

impl MessageDispatchService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        conversations: Arc<dyn ConversationRepository>,
        users: Arc<dyn UserDirectory>,
        translator: Arc<dyn TranslationGateway>,
        registry: Arc<PresenceRegistry>,
        push: Arc<dyn MessagePush>,
        default_source_lang: String,
    ) -> Self {
        Self {
            messages,
            conversations,
            users,
            translator,
            registry,
            push,
            default_source_lang,
        }
    }

    /// 分发一条私聊消息
    ///
    /// 会话必须已存在：创建路径只有 find-or-create 一条，
    /// 分发不隐式建会话。
    pub async fn dispatch(&self, cmd: SendMessageCommand) -> ChatResult<DispatchOutcome> {
        if cmd.sender.is_empty() || cmd.receiver.is_empty() || cmd.text.is_empty() {
            return Err(ChatError::InvalidMessage(
                "Missing required message fields".to_string(),
            ));
        }
        if cmd.sender == cmd.receiver {
            return Err(ChatError::InvalidMessage(
                "sender and receiver must be distinct".to_string(),
            ));
        }
        if cmd.conversation_id.is_empty() {
            return Err(ChatError::InvalidMessage(
                "missing conversationId".to_string(),
            ));
        }
        self.conversations
            .get(&cmd.conversation_id)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(cmd.conversation_id.clone()))?;

        let (translated_text, translated_language) =
            self.resolve_translation(&cmd.receiver, &cmd.text).await;

        // 先持久化消息，再更新会话指针；两次写入之间没有跨写事务，
        // 中途崩溃会留下无指针的消息，属于已知且可接受的缺口
        let message = self
            .messages
            .create(NewMessage {
                conversation_id: cmd.conversation_id.clone(),
                sender: cmd.sender.clone(),
                receiver: cmd.receiver.clone(),
                original_text: cmd.text.clone(),
                translated_text: Some(translated_text),
                original_language: self.default_source_lang.clone(),
                translated_language: Some(translated_language),
                kind: MessageKind::Text,
                attachment: None,
            })
            .await?;
        self.conversations
            .record_message(&cmd.conversation_id, &message)
            .await?;

        // 投递之前的在线读数在挂起后可能已失效；
        // 投递失败降级为离线送达，不中断分发
        let receiver_view = MessageDelivery::receiver_view(&message, cmd.client_message_id.clone());
        let delivered_live = match self.push.push_message(&message.receiver, &receiver_view).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(
                    receiver = %message.receiver,
                    message_id = %message.id,
                    error = %err,
                    "live delivery failed, message remains store-and-forward"
                );
                false
            }
        };

        info!(
            message_id = %message.id,
            sender = %message.sender,
            receiver = %message.receiver,
            conversation_id = %message.conversation_id,
            delivered_live = delivered_live,
            "message dispatched"
        );

        let sender_view = MessageDelivery::sender_view(&message, cmd.client_message_id);
        Ok(DispatchOutcome {
            message,
            delivered_live,
            sender_view,
        })
    }

    /// 解析接收方首选语言并按需翻译
    ///
    /// 返回 (译文, 译文语言)。接收方档案缺席、未设首选语言或与源语言
    /// 相同时跳过翻译；翻译失败降级为原文透传，只记录不上抛。
    async fn resolve_translation(&self, receiver: &str, text: &str) -> (String, String) {
        let source = self.default_source_lang.as_str();
        let target = match self.users.find(receiver).await {
            Ok(Some(profile)) => profile.preferred_language,
            Ok(None) => None,
            Err(err) => {
                warn!(receiver = %receiver, error = %err, "user lookup failed, skipping translation");
                None
            }
        };
        let Some(target) = target.filter(|lang| !lang.is_empty() && lang != source) else {
            return (text.to_string(), source.to_string());
        };

        match self.translator.translate(text, source, &target).await {
            Ok(translated) => {
                debug!(receiver = %receiver, target = %target, "message translated");
                (translated, target)
            }
            Err(err) => {
                warn!(
                    receiver = %receiver,
                    target = %target,
                    error = %err,
                    "translation failed, falling back to original text"
                );
                (text.to_string(), source.to_string())
            }
        }
    }

    /// 标记会话已读并通知对端
    ///
    /// 已读回执是尽力而为：任何失败由调用方记录后忽略，绝不影响体验。
    /// 通知只在实际发生未读到已读的跃迁时发出，重复调用为可观测空操作。
    pub async fn mark_seen(&self, cmd: MarkSeenCommand) -> ChatResult<()> {
        let conversation = self
            .conversations
            .get(&cmd.conversation_id)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(cmd.conversation_id.clone()))?;

        let flipped = self
            .messages
            .mark_seen_bulk(&cmd.conversation_id, &cmd.user_id)
            .await?;
        self.conversations
            .add_read_by(&cmd.conversation_id, &cmd.user_id)
            .await?;

        if flipped == 0 {
            debug!(
                conversation_id = %cmd.conversation_id,
                user_id = %cmd.user_id,
                "mark_seen without unseen messages, no notification"
            );
            return Ok(());
        }

        if let Some(other) = conversation.other_participant(&cmd.user_id) {
            if self.registry.is_online(other).await {
                if let Err(err) = self
                    .push
                    .push_messages_seen(other, &cmd.conversation_id, &cmd.user_id)
                    .await
                {
                    debug!(user_id = %other, error = %err, "seen notification emit failed");
                }
            }
        }
        Ok(())
    }

    /// 转发附件消息通知
    ///
    /// 附件记录已在带外上传时落库，这里只做实时转发；
    /// 返回的视图同时用于发送方即时回显。
    pub async fn forward_attachment(
        &self,
        cmd: AttachmentNoticeCommand,
    ) -> ChatResult<(MessageDelivery, bool)> {
        let delivery = MessageDelivery {
            id: cmd.message_id,
            conversation_id: cmd.conversation_id,
            sender: cmd.sender,
            receiver: cmd.receiver.clone(),
            text: cmd.text.clone(),
            original_text: cmd.text,
            kind: cmd.kind,
            attachment: Some(cmd.attachment),
            client_message_id: None,
            created_at: cmd.created_at.unwrap_or_else(Utc::now),
        };
        let delivered_live = self.push.push_message(&cmd.receiver, &delivery).await?;
        debug!(
            message_id = %delivery.id,
            receiver = %cmd.receiver,
            kind = %delivery.kind.as_str(),
            delivered_live = delivered_live,
            "attachment notice forwarded"
        );
        Ok((delivery, delivered_live))
    }
}
