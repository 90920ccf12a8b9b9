//! 数据模型模块
//! 认证、地图与游戏化接口的请求/响应类型

pub mod auth;
pub mod gamification;
pub mod maps;
pub mod user;

use serde::{Deserialize, Serialize};

/// 分页响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// 列表响应：后端可能返回裸数组，也可能返回分页对象
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Paged(page) => page.results,
            Listing::Plain(items) => items,
        }
    }
}
