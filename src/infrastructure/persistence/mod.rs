//! 消息/会话/用户存储实现

mod memory;
mod postgres;

pub use memory::{
    InMemoryConversationRepository, InMemoryMessageRepository, InMemoryUserDirectory,
};
pub use postgres::{
    PostgresConversationRepository, PostgresMessageRepository, PostgresStore,
    PostgresUserDirectory,
};
