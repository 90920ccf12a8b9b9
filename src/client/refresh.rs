//! 令牌刷新协调器
//!
//! 状态机：`Normal` → `Refreshing` → `Normal` | `Failed`。
//!
//! - 每个请求在收到 401 后最多触发一次刷新、一次重放；
//! - 刷新调用使用独立的、不经过拦截器的请求；
//! - 同一时刻只有一个刷新在进行，并发的 401 共享同一个刷新结果；
//! - 刷新失败时清除两个令牌并发布 `SessionExpired`。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::{
    auth::{SessionEvent, SessionProvider},
    error::{extract_message, ApiError, RefreshFailure, Result},
    models::auth::{RefreshRequest, RefreshResponse},
};

/// 刷新状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Normal,
    Refreshing,
    Failed,
}

type RefreshOutcome = std::result::Result<String, RefreshFailure>;
type InflightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;
type InflightSlot = Arc<Mutex<Option<(u64, InflightRefresh)>>>;

pub struct RefreshCoordinator {
    /// 不带拦截器的独立客户端
    http: reqwest::Client,
    refresh_url: Url,
    session: Arc<SessionProvider>,
    state: Arc<Mutex<RefreshState>>,
    /// 进行中的刷新；由刷新本身在完成时清空
    inflight: InflightSlot,
    generation: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(http: reqwest::Client, refresh_url: Url, session: Arc<SessionProvider>) -> Self {
        Self {
            http,
            refresh_url,
            session,
            state: Arc::new(Mutex::new(RefreshState::Normal)),
            inflight: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RefreshState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 新会话建立后恢复正常状态
    pub fn reset(&self) {
        set_state(&self.state, RefreshState::Normal);
    }

    /// 为使用 `stale_token` 被拒绝的请求获取新的访问令牌
    ///
    /// 如果存储中的访问令牌已经被其他流程替换，直接返回新令牌而不再刷新。
    pub async fn refresh(&self, stale_token: Option<&str>) -> Result<String> {
        if let Some(current) = self.session.access_token() {
            if stale_token != Some(current.as_str()) {
                debug!("Access token already rotated, replaying with current token");
                return Ok(current);
            }
        }

        let refresh = self.join_or_start()?;
        refresh.await.map_err(ApiError::SessionExpired)
    }

    /// 无法恢复的认证失败（例如重放后仍为 401）
    pub fn fail(&self, failure: RefreshFailure) -> ApiError {
        set_state(&self.state, RefreshState::Failed);
        metrics::counter!("auth_token_refresh_total", "outcome" => "failure").increment(1);
        self.session.expire(&failure.to_string());
        ApiError::SessionExpired(failure)
    }

    fn join_or_start(&self) -> Result<InflightRefresh> {
        let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((generation, refresh)) = slot.as_ref() {
            debug!(generation, "Joining in-flight token refresh");
            return Ok(refresh.clone());
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            drop(slot);
            warn!("Received 401 but no refresh token is stored");
            return Err(self.fail(RefreshFailure::MissingRefreshToken));
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        set_state(&self.state, RefreshState::Refreshing);

        let refresh = run_refresh(
            self.http.clone(),
            self.refresh_url.clone(),
            self.session.clone(),
            self.state.clone(),
            refresh_token,
        )
        .then(finish_inflight(self.inflight.clone(), generation))
        .boxed()
        .shared();

        *slot = Some((generation, refresh.clone()));
        Ok(refresh)
    }
}

fn set_state(state: &Mutex<RefreshState>, next: RefreshState) {
    *state.lock().unwrap_or_else(|e| e.into_inner()) = next;
}

/// 刷新完成后释放槽位（仅当槽位仍属于本次刷新）
fn finish_inflight(
    slot: InflightSlot,
    generation: u64,
) -> impl FnOnce(RefreshOutcome) -> futures::future::Ready<RefreshOutcome> {
    move |outcome| {
        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(slot.as_ref(), Some((g, _)) if *g == generation) {
            *slot = None;
        }
        futures::future::ready(outcome)
    }
}

/// 执行一次刷新；成功保存新令牌，失败则结束会话
async fn run_refresh(
    http: reqwest::Client,
    url: Url,
    session: Arc<SessionProvider>,
    state: Arc<Mutex<RefreshState>>,
    refresh_token: String,
) -> RefreshOutcome {
    info!("Access token rejected, refreshing");

    match request_new_token(&http, url, &refresh_token).await {
        Ok(response) => {
            if let Err(e) = session.store_refreshed(&response.access, response.refresh.as_deref()) {
                warn!(error = %e, "Failed to persist refreshed access token");
            }
            set_state(&state, RefreshState::Normal);
            metrics::counter!("auth_token_refresh_total", "outcome" => "success").increment(1);
            session.events().publish(SessionEvent::TokenRefreshed);
            info!("Access token refreshed");
            Ok(response.access)
        }
        Err(failure) => {
            set_state(&state, RefreshState::Failed);
            metrics::counter!("auth_token_refresh_total", "outcome" => "failure").increment(1);
            session.expire(&failure.to_string());
            Err(failure)
        }
    }
}

async fn request_new_token(
    http: &reqwest::Client,
    url: Url,
    refresh_token: &str,
) -> std::result::Result<RefreshResponse, RefreshFailure> {
    let response = http
        .post(url)
        .json(&RefreshRequest {
            refresh: refresh_token,
        })
        .send()
        .await
        .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.json::<serde_json::Value>().await.ok();
        let message = body
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));
        warn!(status = status.as_u16(), %message, "Token refresh rejected");
        return Err(RefreshFailure::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<RefreshResponse>()
        .await
        .map_err(|e| RefreshFailure::Malformed(e.to_string()))
}
