//! Health Map 客户端库
//! 带令牌刷新的认证 API 客户端，以及地图与游戏化接口封装

pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;

pub use app::HealthMap;
pub use client::ApiClient;
pub use error::{ApiError, Result};
pub use services::{AuthService, AuthState};
