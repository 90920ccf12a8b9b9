//! 请求拦截器
//! 为每个请求附加访问令牌和请求 ID

use reqwest::{header, RequestBuilder};
use uuid::Uuid;

/// 请求 ID 头
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 附加 bearer 凭据；没有令牌时原样发送
pub fn authorize(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
        None => builder,
    }
}

/// 附加请求 ID，重放时沿用同一个 ID
pub fn tag(builder: RequestBuilder, request_id: &Uuid) -> RequestBuilder {
    builder.header(REQUEST_ID_HEADER, request_id.to_string())
}
