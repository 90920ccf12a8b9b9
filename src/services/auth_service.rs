//! 认证服务：登录、注册、登出、资料刷新
//!
//! 认证状态保存在 `SessionProvider` 中，通过 watch 通道对外发布，
//! 初始为 `Unknown`，直到 `initialize` 完成。会话失效时由 `SessionProvider`
//! 与令牌一起同步清除。

use serde_json::Value;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    auth::{AuthState, SessionEvent},
    client::{ApiClient, PendingRequest},
    error::Result,
    models::{
        auth::{AuthResponse, ChangePasswordRequest, LoginRequest, ProfileUpdate, RegisterRequest},
        user::User,
    },
};

pub const LOGIN_PATH: &str = "/auth/login/";
pub const REGISTER_PATH: &str = "/auth/register/";
pub const CURRENT_USER_PATH: &str = "/auth/me/";
pub const PROFILE_PATH: &str = "/auth/profile/";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password/";

pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn state(&self) -> AuthState {
        self.client.session().auth_state()
    }

    pub fn current_user(&self) -> Option<User> {
        self.client.session().current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// 订阅认证状态变化
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<AuthState> {
        self.client.session().watch_auth_state()
    }

    fn set_state(&self, next: AuthState) -> AuthState {
        self.client.session().set_auth_state(next)
    }

    /// 启动检查：有访问令牌时尝试获取资料，失败则清除令牌
    pub async fn initialize(&self) -> AuthState {
        let session = self.client.session();
        if !session.has_session() {
            debug!("No stored session");
            self.set_state(AuthState::Unauthenticated);
            return AuthState::Unauthenticated;
        }

        let next = match self.fetch_current_user().await {
            Ok(user) => {
                info!(username = %user.username, "Restored stored session");
                AuthState::Authenticated(user)
            }
            Err(e) => {
                warn!(error = %e, "Stored session is not usable, clearing credentials");
                session.clear();
                AuthState::Unauthenticated
            }
        };

        self.set_state(next.clone());
        next
    }

    /// 用户登录
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        // 先清除当前用户，避免网络往返期间显示旧身份
        self.set_state(AuthState::Unauthenticated);

        let request = PendingRequest::post(LOGIN_PATH)
            .public()
            .json(&LoginRequest::new(username, password))?;

        let response: AuthResponse = self.client.send_json(request).await.map_err(|e| {
            warn!(%username, error = %e, "Login failed");
            e
        })?;

        let user = self.establish_session(&response, username).await?;

        info!(username = %user.username, "Logged in");
        self.client.session().events().publish(SessionEvent::LoggedIn {
            username: user.username.clone(),
        });
        Ok(user)
    }

    /// 用户注册（先做本地校验，失败时不发请求）
    pub async fn register(&self, fields: &RegisterRequest) -> Result<User> {
        fields.validate()?;

        let request = PendingRequest::post(REGISTER_PATH).public().json(fields)?;
        let response: AuthResponse = self.client.send_json(request).await.map_err(|e| {
            warn!(username = %fields.username, error = %e, "Registration failed");
            e
        })?;

        let user = self.establish_session(&response, &fields.username).await?;

        info!(username = %user.username, "Registered");
        self.client.session().events().publish(SessionEvent::Registered {
            username: user.username.clone(),
        });
        Ok(user)
    }

    /// 登出：仅清除本地令牌与用户，不调用服务端
    pub fn logout(&self) {
        self.client.session().clear();
        let previous = self.set_state(AuthState::Unauthenticated);
        if previous.is_authenticated() {
            info!("Logged out");
        }
        self.client.session().events().publish(SessionEvent::LoggedOut);
    }

    /// 重新获取当前用户；失败时登出
    pub async fn refresh_user_profile(&self) -> Result<User> {
        match self.fetch_current_user().await {
            Ok(user) => {
                self.set_state(AuthState::Authenticated(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh user profile, logging out");
                self.logout();
                Err(e)
            }
        }
    }

    /// 获取个人资料
    pub async fn get_profile(&self) -> Result<User> {
        let payload: Value = self.client.get(PROFILE_PATH).await?;
        User::from_payload(&payload)
    }

    /// 更新个人资料
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        update.validate()?;

        let payload: Value = self.client.put(PROFILE_PATH, update).await?;
        let mut user = User::from_payload(&payload)?;

        // 资料接口不一定返回权限标志，沿用当前用户的值
        if let Some(current) = self.current_user() {
            user.is_staff |= current.is_staff;
            user.is_superuser |= current.is_superuser;
        }

        self.set_state(AuthState::Authenticated(user.clone()));
        self.client.session().events().publish(SessionEvent::ProfileUpdated);
        Ok(user)
    }

    /// 修改密码
    pub async fn change_password(&self, request: &ChangePasswordRequest) -> Result<()> {
        request.validate()?;

        self.client
            .send_empty(PendingRequest::post(CHANGE_PASSWORD_PATH).json(request)?)
            .await?;
        info!("Password changed");
        Ok(())
    }

    async fn fetch_current_user(&self) -> Result<User> {
        let payload: Value = self.client.get(CURRENT_USER_PATH).await?;
        User::from_payload(&payload)
    }

    /// 保存令牌并获取完整资料；资料获取失败时回退到登录响应中的用户
    async fn establish_session(&self, response: &AuthResponse, username: &str) -> Result<User> {
        self.client.session().store_tokens(&response.tokens)?;
        self.client.reset_refresh_state();

        let user = match self.fetch_current_user().await {
            Ok(user) => user,
            Err(e) if e.is_session_expired() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Profile fetch failed, using user from auth response");
                User::from_payload(&response.user).unwrap_or_else(|_| User::minimal(username))
            }
        };

        self.set_state(AuthState::Authenticated(user.clone()));
        Ok(user)
    }
}
