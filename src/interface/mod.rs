//! 接入层：WebSocket 服务与线协议

pub mod ws;
