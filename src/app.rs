//! 客户端装配
//! 由配置构建凭据存储、会话、API 客户端与各业务服务

use std::sync::Arc;

use crate::{
    auth::SessionProvider,
    client::ApiClient,
    config::ClientConfig,
    error::Result,
    services::{AuthService, GamificationService, MapsService},
    store::{self, CredentialStore},
};

/// 应用上下文
///
/// 所有服务共享同一个 SessionProvider，令牌只有一个读写入口。
pub struct HealthMap {
    pub config: ClientConfig,
    pub session: Arc<SessionProvider>,
    pub client: ApiClient,
    pub auth: Arc<AuthService>,
    pub maps: MapsService,
    pub gamification: GamificationService,
}

impl HealthMap {
    /// 按配置打开凭据存储并构建上下文
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let store = store::open(&config.storage)?;
        Self::with_store(config, store)
    }

    /// 使用指定的凭据存储构建上下文
    pub fn with_store(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let session = Arc::new(SessionProvider::new(store));
        let client = ApiClient::new(&config.api, session.clone())?;

        Ok(Self {
            auth: Arc::new(AuthService::new(client.clone())),
            maps: MapsService::new(client.clone()),
            gamification: GamificationService::new(client.clone()),
            client,
            session,
            config,
        })
    }
}
