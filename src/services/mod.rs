//! Business logic services layer

pub mod auth_service;
pub mod gamification_service;
pub mod maps_service;

pub use crate::auth::AuthState;
pub use auth_service::AuthService;
pub use gamification_service::GamificationService;
pub use maps_service::MapsService;
