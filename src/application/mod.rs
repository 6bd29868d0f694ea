//! 应用层：接入边界规范化后的命令类型

pub mod commands;
