//! 统一错误模型
//! 定义客户端所有错误类型，并将后端错误响应归一化为可读消息

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ApiError>;

/// 字段级错误（字段名 -> 错误消息列表）
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// 请求体中不作为字段错误处理的键
const MESSAGE_KEYS: [&str; 4] = ["message", "error", "detail", "code"];

/// 令牌刷新失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("token refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("token refresh request failed: {0}")]
    Transport(String),

    #[error("malformed token refresh response: {0}")]
    Malformed(String),

    #[error("request was rejected again after a token refresh")]
    ReplayRejected,
}

/// 客户端错误类型
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("{message}")]
    Server {
        status: u16,
        message: String,
        field_errors: FieldErrors,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field_errors: FieldErrors,
    },

    #[error("Session expired: {0}")]
    SessionExpired(RefreshFailure),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// 未收到任何响应（连接失败、超时）
    pub fn is_network_error(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout(_))
    }

    /// 会话已失效，需要重新登录
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }

    /// 后端返回的 HTTP 状态码
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::SessionExpired(_) => Some(401),
            _ => None,
        }
    }

    /// 字段级错误
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Server { field_errors, .. } | ApiError::Validation { field_errors, .. }
                if !field_errors.is_empty() =>
            {
                Some(field_errors)
            }
            _ => None,
        }
    }

    /// 获取用户友好的错误消息
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => {
                "Unable to reach the server. Please check your connection.".to_string()
            }
            ApiError::Timeout(_) => "The server took too long to respond.".to_string(),
            ApiError::Server { message, .. } => message.clone(),
            ApiError::Validation { message, .. } => message.clone(),
            ApiError::SessionExpired(_) => "Your session has expired. Please log in again.".to_string(),
            ApiError::Decode(_) => "Unexpected response from the server".to_string(),
            ApiError::Storage(_) => "Unable to access saved credentials".to_string(),
            ApiError::Config(_) => "Configuration error".to_string(),
        }
    }

    // 便捷方法
    pub fn decode(msg: &str) -> Self {
        ApiError::Decode(msg.to_string())
    }

    /// 由状态码和（可能为空的）响应体构造服务端错误
    pub fn from_status(status: u16, body: Option<&Value>) -> Self {
        let field_errors = body.map(extract_field_errors).unwrap_or_default();
        let message = body
            .and_then(extract_message)
            .or_else(|| first_field_error(&field_errors))
            .unwrap_or_else(|| format!("Request failed with status code {}", status));

        ApiError::Server {
            status,
            message,
            field_errors,
        }
    }

    /// 将传输层错误分类
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if err.is_builder() {
            ApiError::Config(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// 按 message、error、detail 的优先级提取错误消息
pub fn extract_message(body: &Value) -> Option<String> {
    for key in ["message", "error", "detail"] {
        match body.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Object(nested)) => {
                if let Some(Value::String(s)) = nested.get("message") {
                    return Some(s.clone());
                }
            }
            _ => {}
        }
    }
    None
}

/// 提取 `{"field": ["msg", ...]}` 形式的字段错误
pub fn extract_field_errors(body: &Value) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let Some(map) = body.as_object() else {
        return errors;
    };

    for (field, value) in map {
        if MESSAGE_KEYS.contains(&field.as_str()) {
            continue;
        }
        if let Value::Array(items) = value {
            let messages: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if !messages.is_empty() {
                errors.insert(field.clone(), messages);
            }
        }
    }

    errors
}

fn first_field_error(errors: &FieldErrors) -> Option<String> {
    errors.iter().find_map(|(field, messages)| {
        messages.first().map(|m| {
            if field == "non_field_errors" {
                m.clone()
            } else {
                format!("{}: {}", field, m)
            }
        })
    })
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut field_errors = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("invalid value ({})", e.code),
                })
                .collect();
            field_errors.insert(field.to_string(), messages);
        }

        let message = first_field_error(&field_errors)
            .unwrap_or_else(|| "Invalid input".to_string());

        ApiError::Validation {
            message,
            field_errors,
        }
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for ApiError {
    fn from(e: config::ConfigError) -> Self {
        ApiError::Config(e.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}
