//! 认证状态
//! 内存中当前用户的唯一表示

use crate::models::user::User;

/// 认证状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// 启动检查尚未完成
    Unknown,
    Authenticated(User),
    Unauthenticated,
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}
