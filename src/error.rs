//! 消息核心错误类型定义

use thiserror::Error;

/// 消息核心错误类型
#[derive(Debug, Error)]
pub enum ChatError {
    /// 消息缺少必填字段或格式非法
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// 翻译服务不可用（超时、非 2xx、响应格式异常）
    #[error("Translation unavailable: {0}")]
    TranslationUnavailable(String),

    /// 会话未找到
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// 存储写入失败
    #[error("Store write failed: {0}")]
    StoreWrite(String),

    /// 存储查询失败
    #[error("Store query failed: {0}")]
    StoreQuery(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 消息核心结果类型
pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    /// 是否属于发送方输入问题（以 error_message 原样回执，不作为服务端故障上报）
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            ChatError::InvalidMessage(_) | ChatError::ConversationNotFound(_)
        )
    }
}
