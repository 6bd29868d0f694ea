//! WebSocket 接入

pub mod broadcast;
pub mod connection;
pub mod events;
pub mod push;
pub mod server;

pub use broadcast::PresenceBroadcast;
pub use connection::{ConnectionManager, EventSender};
pub use push::WsMessagePush;
