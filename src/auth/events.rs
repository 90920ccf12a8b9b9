//! 会话事件总线
//! 凭据发生变化时通知所有持有状态的订阅者

use tokio::sync::broadcast;

/// 会话事件类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 登录成功
    LoggedIn { username: String },
    /// 注册成功
    Registered { username: String },
    /// 主动登出
    LoggedOut,
    /// 访问令牌已刷新
    TokenRefreshed,
    /// 用户资料已更新
    ProfileUpdated,
    /// 会话失效（刷新失败），订阅者应丢弃所有与用户相关的状态并回到登录入口
    SessionExpired { reason: String },
}

impl SessionEvent {
    /// 获取事件类型名称
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::LoggedIn { .. } => "logged_in",
            SessionEvent::Registered { .. } => "registered",
            SessionEvent::LoggedOut => "logged_out",
            SessionEvent::TokenRefreshed => "token_refreshed",
            SessionEvent::ProfileUpdated => "profile_updated",
            SessionEvent::SessionExpired { .. } => "session_expired",
        }
    }
}

/// 事件总线
#[derive(Debug, Clone)]
pub struct EventBus {
    /// 广播发送器（用于向所有订阅者发送事件）
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件，没有订阅者时直接丢弃
    pub fn publish(&self, event: SessionEvent) {
        let kind = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(event = kind, receivers, "Session event published"),
            Err(_) => tracing::trace!(event = kind, "Session event dropped, no subscribers"),
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
