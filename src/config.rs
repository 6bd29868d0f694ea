//! 应用配置模块
//!
//! TOML 配置文件加载 + 环境变量覆盖。
//! 配置文件路径由 `BABEL_CONFIG` 指定，缺省为 `config/babel.toml`；
//! 文件不存在时使用内置默认值，保证零配置可启动。

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{ChatError, ChatResult};

/// 应用配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// 接入服务配置
    #[serde(default)]
    pub server: ServerSettings,
    /// 在线状态配置
    #[serde(default)]
    pub presence: PresenceSettings,
    /// 翻译服务配置
    #[serde(default)]
    pub translation: TranslationSettings,
    /// 消息存储配置
    #[serde(default)]
    pub store: StoreSettings,
}

/// 接入服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 监听地址
    #[serde(default = "default_address")]
    pub address: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

/// 在线状态配置
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    /// 断线宽限期（秒）：宽限期内重连不触发下线广播
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// 僵尸连接清扫周期（秒）
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// 最大静默时长（秒），超过即视为僵尸连接
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,
}

/// 翻译服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationSettings {
    /// LibreTranslate 兼容服务地址
    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,
    /// 单次翻译调用超时（毫秒），必须有界
    #[serde(default = "default_translate_timeout_ms")]
    pub timeout_ms: u64,
    /// 默认源语言
    #[serde(default = "default_source_lang")]
    pub default_source_lang: String,
}

/// 消息存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存（测试与单进程部署）
    #[default]
    Memory,
    /// PostgreSQL 持久化
    Postgres,
}

/// 消息存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// 存储后端
    #[serde(default)]
    pub backend: StoreBackend,
    /// PostgreSQL 连接 URL（backend = "postgres" 时必填）
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_grace_period_secs() -> u64 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_idle_secs() -> u64 {
    300
}

fn default_translate_endpoint() -> String {
    "http://localhost:5001".to_string()
}

fn default_translate_timeout_ms() -> u64 {
    3000
}

fn default_source_lang() -> String {
    "en".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_idle_secs: default_max_idle_secs(),
        }
    }
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            endpoint: default_translate_endpoint(),
            timeout_ms: default_translate_timeout_ms(),
            default_source_lang: default_source_lang(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            postgres_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl ServerSettings {
    /// 监听地址字符串 "address:port"
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl PresenceSettings {
    /// 断线宽限期
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// 清扫周期
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 最大静默时长
    pub fn max_idle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_idle_secs as i64)
    }
}

impl TranslationSettings {
    /// 翻译调用超时
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Settings {
    /// 加载配置
    pub fn load() -> ChatResult<Self> {
        let path = env::var("BABEL_CONFIG").unwrap_or_else(|_| "config/babel.toml".to_string());
        let mut settings = Self::from_file(&path)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// 从指定文件加载；文件不存在时使用默认值
    pub fn from_file(path: &str) -> ChatResult<Self> {
        if !Path::new(path).exists() {
            warn!(path = %path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|err| ChatError::Configuration(format!("read {}: {}", path, err)))?;
        toml::from_str(&raw)
            .map_err(|err| ChatError::Configuration(format!("parse {}: {}", path, err)))
    }

    /// 环境变量覆盖部署敏感项
    fn apply_env_overrides(&mut self) {
        if let Ok(address) = env::var("BABEL_SERVER_ADDRESS") {
            self.server.address = address;
        }
        if let Ok(port) = env::var("BABEL_SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(err) => warn!(value = %port, error = %err, "ignoring invalid BABEL_SERVER_PORT"),
            }
        }
        if let Ok(endpoint) = env::var("BABEL_TRANSLATE_URL") {
            self.translation.endpoint = endpoint;
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.store.postgres_url = Some(url);
            self.store.backend = StoreBackend::Postgres;
        }
    }

    fn validate(&self) -> ChatResult<()> {
        if self.store.backend == StoreBackend::Postgres && self.store.postgres_url.is_none() {
            return Err(ChatError::Configuration(
                "store.backend = \"postgres\" requires store.postgres_url or DATABASE_URL".to_string(),
            ));
        }
        if self.translation.timeout_ms == 0 {
            return Err(ChatError::Configuration(
                "translation.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.bind_addr(), "0.0.0.0:8090");
        assert_eq!(settings.presence.grace_period(), Duration::from_secs(5));
        assert_eq!(settings.presence.sweep_interval(), Duration::from_secs(60));
        assert_eq!(settings.presence.max_idle(), chrono::Duration::seconds(300));
        assert_eq!(settings.translation.default_source_lang, "en");
        assert_eq!(settings.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            [server]
            port = 9000

            [presence]
            grace_period_secs = 2

            [translation]
            endpoint = "http://translate.internal:5001"
            timeout_ms = 1500

            [store]
            backend = "postgres"
            postgres_url = "postgres://localhost/babel"
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.server.port, 9000);
        // 未显式给出的字段回退到默认值
        assert_eq!(settings.server.address, "0.0.0.0");
        assert_eq!(settings.presence.grace_period_secs, 2);
        assert_eq!(settings.presence.max_idle_secs, 300);
        assert_eq!(settings.translation.timeout(), Duration::from_millis(1500));
        assert_eq!(settings.store.backend, StoreBackend::Postgres);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_postgres_backend_requires_url() {
        let settings: Settings = toml::from_str("[store]\nbackend = \"postgres\"\n").unwrap();
        assert!(settings.validate().is_err());
    }
}
