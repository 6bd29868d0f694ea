//! 内存仓储实现
//!
//! 用于测试与单进程部署；与 PostgreSQL 实现遵守同一套接口契约。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::model::{
    Conversation, Message, NewMessage, ParticipantPair, UserProfile,
};
use crate::domain::repository::{ConversationRepository, MessageRepository, UserDirectory};
use crate::error::ChatResult;

/// 内存消息仓储
#[derive(Default)]
pub struct InMemoryMessageRepository {
    inner: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: NewMessage) -> ChatResult<Message> {
        let message = Message::from_new(message);
        let mut guard = self.inner.write().await;
        guard.push(message.clone());
        Ok(message)
    }

    async fn mark_seen_bulk(&self, conversation_id: &str, receiver: &str) -> ChatResult<u64> {
        let mut guard = self.inner.write().await;
        let mut flipped = 0;
        for message in guard.iter_mut() {
            if message.conversation_id == conversation_id
                && message.receiver == receiver
                && !message.seen
            {
                message.seen = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn delete_by_conversation(&self, conversation_id: &str) -> ChatResult<u64> {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|message| message.conversation_id != conversation_id);
        Ok((before - guard.len()) as u64)
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> ChatResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut messages: Vec<Message> = guard
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn list_between(&self, user_a: &str, user_b: &str) -> ChatResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut messages: Vec<Message> = guard
            .iter()
            .filter(|message| {
                (message.sender == user_a && message.receiver == user_b)
                    || (message.sender == user_b && message.receiver == user_a)
            })
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn count_unseen(&self, conversation_id: &str, receiver: &str) -> ChatResult<u64> {
        let guard = self.inner.read().await;
        Ok(guard
            .iter()
            .filter(|message| {
                message.conversation_id == conversation_id
                    && message.receiver == receiver
                    && !message.seen
            })
            .count() as u64)
    }
}

/// 内存会话仓储
#[derive(Default)]
pub struct InMemoryConversationRepository {
    inner: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_or_create(&self, pair: &ParticipantPair) -> ChatResult<Conversation> {
        let mut guard = self.inner.write().await;
        let conversation = guard
            .entry(pair.conversation_id())
            .or_insert_with(|| Conversation::new(pair));
        Ok(conversation.clone())
    }

    async fn get(&self, conversation_id: &str) -> ChatResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard.get(conversation_id).cloned())
    }

    async fn record_message(&self, conversation_id: &str, message: &Message) -> ChatResult<()> {
        let mut guard = self.inner.write().await;
        if let Some(conversation) = guard.get_mut(conversation_id) {
            conversation.last_message_id = Some(message.id.clone());
            conversation.updated_at = message.created_at;
            conversation.absorb_participants(&message.sender, &message.receiver);
        }
        Ok(())
    }

    async fn add_read_by(&self, conversation_id: &str, user_id: &str) -> ChatResult<()> {
        let mut guard = self.inner.write().await;
        if let Some(conversation) = guard.get_mut(conversation_id) {
            if !conversation.read_by.iter().any(|reader| reader == user_id) {
                conversation.read_by.push(user_id.to_string());
            }
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<Conversation>> {
        let guard = self.inner.read().await;
        let mut conversations: Vec<Conversation> = guard
            .values()
            .filter(|conversation| {
                conversation
                    .participants
                    .iter()
                    .any(|participant| participant == user_id)
            })
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }
}

/// 内存用户目录
#[derive(Default)]
pub struct InMemoryUserDirectory {
    inner: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入或更新用户档案（种子数据与测试用）
    pub async fn upsert(&self, profile: UserProfile) {
        let mut guard = self.inner.write().await;
        guard.insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find(&self, user_id: &str) -> ChatResult<Option<UserProfile>> {
        let guard = self.inner.read().await;
        Ok(guard.get(user_id).cloned())
    }
}
