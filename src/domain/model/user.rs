//! 用户目录最小视图
//!
//! 账号体系由外部系统负责，核心只读取分发所需的字段

use serde::{Deserialize, Serialize};

/// 用户档案（核心视角为只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    /// 首选语言代码（如 "en"、"hi"），缺席时不翻译
    pub preferred_language: Option<String>,
}
