//! 后端 API 客户端
//! 请求拦截、401 刷新重放、错误归一化

pub mod interceptor;
pub mod refresh;
pub mod request;

pub use refresh::{RefreshCoordinator, RefreshState};
pub use request::{FilePart, PendingRequest, RequestBody};

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{multipart, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{
    auth::SessionProvider,
    config::ApiConfig,
    error::{ApiError, FieldErrors, RefreshFailure, Result},
};

/// 令牌刷新端点
pub const TOKEN_REFRESH_PATH: &str = "/auth/token/refresh/";

/// 带认证的 API 客户端
///
/// 克隆成本低廉（内部为 Arc），所有克隆共享同一个会话与刷新协调器。
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionProvider>,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    /// 创建新的客户端
    pub fn new(config: &ApiConfig, session: Arc<SessionProvider>) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| ApiError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(ApiError::from_transport)?;

        let refresh_url = join_url(&base_url, TOKEN_REFRESH_PATH, &[])?;
        let refresh = RefreshCoordinator::new(http.clone(), refresh_url, session.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                session,
                refresh,
            }),
        })
    }

    pub fn session(&self) -> &Arc<SessionProvider> {
        &self.inner.session
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.inner.refresh.state()
    }

    pub(crate) fn reset_refresh_state(&self) {
        self.inner.refresh.reset();
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(PendingRequest::get(path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(PendingRequest::post(path).json(body)?).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(PendingRequest::put(path).json(body)?).await
    }

    /// 发送请求并解析 JSON 响应体
    pub async fn send_json<T: DeserializeOwned>(&self, req: PendingRequest) -> Result<T> {
        let response = self.execute(req).await?;
        response.json::<T>().await.map_err(ApiError::from_transport)
    }

    /// 发送请求并丢弃响应体
    pub async fn send_empty(&self, req: PendingRequest) -> Result<()> {
        self.execute(req).await.map(|_| ())
    }

    /// 发送请求：附加令牌，401 时刷新并重放一次，非 2xx 归一化为错误
    pub async fn execute(&self, mut req: PendingRequest) -> Result<Response> {
        let mut token = if req.authenticated {
            self.inner.session.access_token()
        } else {
            None
        };

        loop {
            let response = self.send_once(&req, token.as_deref()).await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && req.authenticated {
                if !req.mark_retried() {
                    warn!(
                        request_id = %req.request_id,
                        path = %req.path,
                        "Replayed request rejected, ending session"
                    );
                    return Err(self.inner.refresh.fail(RefreshFailure::ReplayRejected));
                }

                let fresh = self.inner.refresh.refresh(token.as_deref()).await?;
                debug!(request_id = %req.request_id, path = %req.path, "Replaying request");
                token = Some(fresh);
                continue;
            }

            if status.is_success() {
                return Ok(response);
            }

            return Err(error_from_response(response).await);
        }
    }

    async fn send_once(&self, req: &PendingRequest, token: Option<&str>) -> Result<Response> {
        let url = join_url(&self.inner.base_url, &req.path, &req.query)?;
        let mut builder = self.inner.http.request(req.method.clone(), url);
        builder = interceptor::authorize(builder, token);
        builder = interceptor::tag(builder, &req.request_id);

        builder = match &req.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let start = Instant::now();
        let result = builder.send().await;
        let elapsed = start.elapsed();

        let status_label = match &result {
            Ok(response) => response.status().as_u16().to_string(),
            Err(_) => "network_error".to_string(),
        };
        metrics::counter!(
            "api_requests_total",
            "method" => req.method.to_string(),
            "status" => status_label.clone()
        )
        .increment(1);
        metrics::histogram!("api_request_duration_seconds").record(elapsed.as_secs_f64());

        debug!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            status = %status_label,
            retry = req.is_retry(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        result.map_err(|e| {
            warn!(request_id = %req.request_id, path = %req.path, error = %e, "Request failed without response");
            ApiError::from_transport(e)
        })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("refresh_state", &self.refresh_state())
            .finish()
    }
}

/// 转义单个路径段
///
/// `/` 等字符会被转义；`.` 与 `..` 会被 URL 解析为目录跳转，直接拒绝。
pub fn path_segment(value: &str) -> Result<String> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(ApiError::Validation {
            message: format!("Invalid path segment: {:?}", value),
            field_errors: FieldErrors::new(),
        });
    }
    Ok(urlencoding::encode(value).into_owned())
}

/// 拼接根地址与路径（保留根地址中的路径前缀，如 `/api`）
fn join_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let raw = if path.starts_with('/') {
        format!("{}{}", base_url, path)
    } else {
        format!("{}/{}", base_url, path)
    };

    let mut url = Url::parse(&raw)
        .map_err(|e| ApiError::Config(format!("Invalid request URL '{}': {}", raw, e)))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

fn build_form(parts: &[FilePart]) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for part in parts {
        let file = multipart::Part::bytes(part.bytes.clone())
            .file_name(part.file_name.clone())
            .mime_str(&part.mime)
            .map_err(|e| ApiError::Config(format!("Invalid MIME type '{}': {}", part.mime, e)))?;
        form = form.part(part.field.clone(), file);
    }
    Ok(form)
}

async fn error_from_response(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let body = match response.bytes().await {
        Ok(bytes) => serde_json::from_slice::<serde_json::Value>(&bytes).ok(),
        Err(e) => {
            debug!(status, error = %e, "Failed to read error response body");
            None
        }
    };
    ApiError::from_status(status, body.as_ref())
}
