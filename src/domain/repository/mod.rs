//! 领域仓储与外部协作方接口
//!
//! 消息存储、会话存储、用户目录与翻译服务都是外部事务性资源，
//! 核心只依赖这里定义的接口；实现由基础设施层注入。

use async_trait::async_trait;

use crate::domain::model::{
    Conversation, Message, MessageDelivery, NewMessage, ParticipantPair, UserProfile,
};
use crate::error::ChatResult;

/// 消息仓储
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化一条新消息，返回完整记录（含分配的ID与时间戳）
    async fn create(&self, message: NewMessage) -> ChatResult<Message>;

    /// 批量置位：会话内发给 receiver 且未读的消息全部置为已读，返回置位条数
    async fn mark_seen_bulk(&self, conversation_id: &str, receiver: &str) -> ChatResult<u64>;

    /// 清空会话消息，返回删除条数
    async fn delete_by_conversation(&self, conversation_id: &str) -> ChatResult<u64>;

    /// 会话内消息，按创建时间升序
    async fn list_by_conversation(&self, conversation_id: &str) -> ChatResult<Vec<Message>>;

    /// 两个用户之间的全部消息（不区分方向），按创建时间升序
    async fn list_between(&self, user_a: &str, user_b: &str) -> ChatResult<Vec<Message>>;

    /// 会话内发给 receiver 的未读条数
    async fn count_unseen(&self, conversation_id: &str, receiver: &str) -> ChatResult<u64>;
}

/// 会话仓储
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 按参与者对查找会话，不存在则创建（幂等，与参数顺序无关）
    async fn find_or_create(&self, pair: &ParticipantPair) -> ChatResult<Conversation>;

    /// 按ID查找会话
    async fn get(&self, conversation_id: &str) -> ChatResult<Option<Conversation>>;

    /// 记录新消息：更新最后消息指针、更新时间与参与者并集
    async fn record_message(&self, conversation_id: &str, message: &Message) -> ChatResult<()>;

    /// 将用户加入会话的已读集合（幂等）
    async fn add_read_by(&self, conversation_id: &str, user_id: &str) -> ChatResult<()>;

    /// 用户参与的全部会话，按更新时间降序
    async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<Conversation>>;
}

/// 用户目录（只读）
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find(&self, user_id: &str) -> ChatResult<Option<UserProfile>>;
}

/// 翻译服务
#[async_trait]
pub trait TranslationGateway: Send + Sync {
    /// 翻译文本；失败以 `TranslationUnavailable` 返回，由调用方决定降级
    async fn translate(&self, text: &str, source: &str, target: &str) -> ChatResult<String>;
}

/// 实时投递端口
///
/// 由接入层连接管理器实现。投递是尽力而为：目标不在线或句柄已失效
/// 时返回 false / 静默失败，绝不中断分发流程。
#[async_trait]
pub trait MessagePush: Send + Sync {
    /// 投递消息视图到用户的直连句柄与广播组（至少一次语义），返回是否命中在线连接
    async fn push_message(&self, user_id: &str, delivery: &MessageDelivery) -> ChatResult<bool>;

    /// 通知用户某会话的消息已被 seen_by 读取，返回是否命中在线连接
    async fn push_messages_seen(
        &self,
        user_id: &str,
        conversation_id: &str,
        seen_by: &str,
    ) -> ChatResult<bool>;
}
