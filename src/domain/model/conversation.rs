//! 私聊会话领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

/// 无序参与者对
///
/// 私聊会话以参与者对为键去重：两个用户之间无论谁先发起，
/// 只存在一个会话。内部按字典序归一化，使键与参数顺序无关。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: String,
    high: String,
}

impl ParticipantPair {
    /// 构造参与者对；两个ID必须非空且互不相同
    pub fn new(a: &str, b: &str) -> ChatResult<Self> {
        if a.is_empty() || b.is_empty() {
            return Err(ChatError::InvalidMessage(
                "participant ids must not be empty".to_string(),
            ));
        }
        if a == b {
            return Err(ChatError::InvalidMessage(
                "private conversation requires two distinct participants".to_string(),
            ));
        }
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Ok(Self {
            low: low.to_string(),
            high: high.to_string(),
        })
    }

    /// 由参与者对确定的会话ID
    ///
    /// ID 可由参与者对直接推导，find-or-create 因此天然幂等
    pub fn conversation_id(&self) -> String {
        format!("single:{}:{}", self.low, self.high)
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }
}

/// 私聊会话
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// 参与者（私聊恒为两人，按字典序存储）
    pub participants: Vec<String>,
    /// 最后一条消息ID
    pub last_message_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// 已读最新消息的参与者集合
    pub read_by: Vec<String>,
}

impl Conversation {
    /// 由参与者对创建新会话
    pub fn new(pair: &ParticipantPair) -> Self {
        Self {
            id: pair.conversation_id(),
            participants: vec![pair.low().to_string(), pair.high().to_string()],
            last_message_id: None,
            updated_at: Utc::now(),
            read_by: Vec::new(),
        }
    }

    /// 会话中给定用户的对端
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|participant| participant.as_str() != user_id)
            .map(String::as_str)
    }

    /// 参与者并集更新：不在集合中的新成员按序插入
    pub fn absorb_participants(&mut self, sender: &str, receiver: &str) {
        for user_id in [sender, receiver] {
            if !self.participants.iter().any(|p| p == user_id) {
                self.participants.push(user_id.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_order_insensitive() {
        let ab = ParticipantPair::new("alice", "bob").unwrap();
        let ba = ParticipantPair::new("bob", "alice").unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.conversation_id(), ba.conversation_id());
        assert_eq!(ab.conversation_id(), "single:alice:bob");
    }

    #[test]
    fn test_pair_rejects_invalid_participants() {
        assert!(ParticipantPair::new("", "bob").is_err());
        assert!(ParticipantPair::new("alice", "").is_err());
        assert!(ParticipantPair::new("alice", "alice").is_err());
    }

    #[test]
    fn test_other_participant() {
        let pair = ParticipantPair::new("alice", "bob").unwrap();
        let conversation = Conversation::new(&pair);
        assert_eq!(conversation.other_participant("alice"), Some("bob"));
        assert_eq!(conversation.other_participant("bob"), Some("alice"));
        assert_eq!(conversation.other_participant("carol"), Some("alice"));
    }

    #[test]
    fn test_absorb_participants_is_set_union() {
        let pair = ParticipantPair::new("alice", "bob").unwrap();
        let mut conversation = Conversation::new(&pair);
        conversation.absorb_participants("alice", "bob");
        assert_eq!(conversation.participants.len(), 2);
    }
}
