//! 待发送请求描述
//! 请求体可重复构建，以便刷新令牌后重放

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// 多部分表单中的文件
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// 请求体
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<FilePart>),
}

/// 一次逻辑请求（可能被发送两次：原始请求与刷新后的重放）
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub request_id: Uuid,
    /// 是否携带访问令牌并参与 401 刷新流程
    pub authenticated: bool,
    retried: bool,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            request_id: Uuid::new_v4(),
            authenticated: true,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// 凭据交换类请求（登录、注册）：不带令牌，也不触发刷新
    pub fn public(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn file(mut self, part: FilePart) -> Self {
        match &mut self.body {
            RequestBody::Multipart(parts) => parts.push(part),
            _ => self.body = RequestBody::Multipart(vec![part]),
        }
        self
    }

    /// 标记为已重试；仅第一次调用返回 true
    pub fn mark_retried(&mut self) -> bool {
        if self.retried {
            return false;
        }
        self.retried = true;
        true
    }

    pub fn is_retry(&self) -> bool {
        self.retried
    }
}
