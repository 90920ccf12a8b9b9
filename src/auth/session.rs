//! 会话提供者
//! 所有令牌读写都经由此对象；同时持有内存中的认证状态，
//! 令牌与当前用户总是在同一步中一起清除

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    auth::{
        events::{EventBus, SessionEvent},
        state::AuthState,
    },
    error::Result,
    models::{auth::TokenPair, user::User},
    store::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY},
};

pub struct SessionProvider {
    store: Arc<dyn CredentialStore>,
    events: EventBus,
    state: watch::Sender<AuthState>,
}

impl SessionProvider {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(AuthState::Unknown);
        Self {
            store,
            events: EventBus::default(),
            state,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// 替换认证状态，返回旧值
    pub fn set_auth_state(&self, next: AuthState) -> AuthState {
        self.state.send_replace(next)
    }

    /// 订阅认证状态变化
    pub fn watch_auth_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// 是否存在已保存的会话
    pub fn has_session(&self) -> bool {
        self.access_token().is_some()
    }

    /// 保存新签发的令牌对
    pub fn store_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.store.set(ACCESS_TOKEN_KEY, &tokens.access)?;
        self.store.set(REFRESH_TOKEN_KEY, &tokens.refresh)?;
        Ok(())
    }

    /// 保存刷新得到的访问令牌（以及轮换后的刷新令牌）
    pub fn store_refreshed(&self, access: &str, refresh: Option<&str>) -> Result<()> {
        self.store.set(ACCESS_TOKEN_KEY, access)?;
        if let Some(refresh) = refresh {
            self.store.set(REFRESH_TOKEN_KEY, refresh)?;
        }
        Ok(())
    }

    /// 删除两个令牌，存储错误只记录不返回
    pub fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(key, error = %e, "Failed to remove credential");
            }
        }
    }

    /// 会话无法恢复：清除令牌和当前用户，再通知订阅者回到登录入口
    pub fn expire(&self, reason: &str) {
        tracing::warn!(reason, "Session expired, clearing credentials");
        self.clear();
        self.state.send_replace(AuthState::Unauthenticated);
        self.events.publish(SessionEvent::SessionExpired {
            reason: reason.to_string(),
        });
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

impl std::fmt::Debug for SessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProvider")
            .field("has_access_token", &self.access_token().is_some())
            .field("has_refresh_token", &self.refresh_token().is_some())
            .finish()
    }
}
