//! # Career Connect
//!
//! 第三方 SaaS 集成的 OAuth 令牌生命周期核心库：授权、交换、加密存储、
//! 刷新与撤销。

pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod provider;

// Re-export commonly used types
pub use app::AppContext;
pub use auth::{IntegrationService, IntegrationStatus};
pub use config::AppConfig;
pub use error::{ConnectError, Result};
