//! 用户模型
//! 将后端多种“当前用户”响应形状归一化为唯一的 User 类型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};

/// 当前用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub date_joined: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

impl User {
    /// 仅含用户名的最小用户记录（资料获取失败时的兜底）
    pub fn minimal(username: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            username: username.into(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            date_joined: None,
            last_login: None,
            is_staff: false,
            is_superuser: false,
        }
    }

    /// 是否具有审核权限
    pub fn is_moderator(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    /// 显示名称：优先使用姓名，否则使用用户名
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    /// 解析任意可接受的用户载荷
    ///
    /// 用户对象可能直接返回，也可能嵌套在 `user` 下；权限标志可能在外层，
    /// 也可能在用户对象内。两处任一为 true 即视为具有该权限。
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let outer = payload
            .as_object()
            .ok_or_else(|| ApiError::decode("user payload is not an object"))?;

        let body = match outer.get("user") {
            Some(Value::Object(inner)) => inner,
            _ => outer,
        };

        let username = body
            .get("username")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::decode("user payload has no username"))?
            .to_string();

        let flag = |name: &str| -> bool {
            let read = |map: &serde_json::Map<String, Value>| {
                map.get(name).and_then(Value::as_bool).unwrap_or(false)
            };
            read(body) || read(outer)
        };

        Ok(Self {
            id: body.get("id").map(id_to_string).unwrap_or_default(),
            username,
            email: string_field(body, "email"),
            first_name: string_field(body, "first_name"),
            last_name: string_field(body, "last_name"),
            date_joined: date_field(body, "date_joined"),
            last_login: date_field(body, "last_login"),
            is_staff: flag("is_staff"),
            is_superuser: flag("is_superuser"),
        })
    }
}

fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn string_field(map: &serde_json::Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn date_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    map.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
