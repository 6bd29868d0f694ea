//! Babel IM Core 实时消息核心库
//!
//! 提供私聊场景下的连接生命周期管理、在线状态追踪、
//! 消息分发与按接收方语言的翻译管道

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interface;
pub mod service;

pub use config::Settings;
pub use error::{ChatError, ChatResult};
