//! 配置系统
//! 从默认值和环境变量（前缀 HEALTHMAP_）加载客户端配置

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// 后端 API 根地址，例如 "http://localhost:8000/api"
    pub base_url: String,
    /// 请求超时时间（秒），未设置时使用传输层默认值
    pub timeout_secs: Option<u64>,
    /// User-Agent 请求头
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 凭据存储后端: file, memory
    pub backend: String,
    /// 凭据文件路径（仅 file 后端）
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, compact
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl ApiConfig {
    /// 指向给定地址、其余使用默认值的配置
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("health-map-client/", env!("CARGO_PKG_VERSION")).to_string()
}

impl ClientConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("api.base_url", "http://localhost:8000/api")?
            .set_default("api.user_agent", default_user_agent())?
            .set_default("storage.backend", "file")?
            .set_default("storage.path", ".healthmap/credentials.json")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;

        // 从环境变量加载配置（前缀为 HEALTHMAP_）
        settings = settings.add_source(
            Environment::with_prefix("HEALTHMAP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: ClientConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::Message(format!("Invalid api.base_url '{}': {}", self.api.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Message(format!(
                "api.base_url must use http or https, got: {}",
                url.scheme()
            )));
        }

        if let Some(timeout) = self.api.timeout_secs {
            if !(1..=300).contains(&timeout) {
                return Err(ConfigError::Message(
                    "api.timeout_secs must be between 1 and 300".to_string(),
                ));
            }
        }

        match self.storage.backend.to_lowercase().as_str() {
            "memory" => {}
            "file" => {
                if self.storage.path.trim().is_empty() {
                    return Err(ConfigError::Message(
                        "storage.path is required for the file backend".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::Message(format!(
                    "Invalid storage backend: {}. Must be one of: file, memory",
                    other
                )))
            }
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, compact",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }
}
