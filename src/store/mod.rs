//! 凭据存储
//! 令牌的持久化键值存储，不做任何过期判断

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use crate::{config::StorageConfig, error::Result};

/// 访问令牌的存储键
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// 刷新令牌的存储键
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// 键值凭据存储
pub trait CredentialStore: Send + Sync {
    /// 读取值，不存在时返回 None
    fn get(&self, key: &str) -> Option<String>;

    /// 写入值（覆盖）
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// 删除值，键不存在时不报错
    fn remove(&self, key: &str) -> Result<()>;
}

/// 根据配置打开凭据存储
pub fn open(config: &StorageConfig) -> Result<Arc<dyn CredentialStore>> {
    match config.backend.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "file" => Ok(Arc::new(FileStore::open(&config.path)?)),
        other => Err(crate::error::ApiError::Config(format!(
            "Unknown storage backend: {}",
            other
        ))),
    }
}
