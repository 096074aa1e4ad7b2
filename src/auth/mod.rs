//! # 认证授权模块
//!
//! OAuth 令牌生命周期：授权 URL 与 state、授权码交换、加密存储、
//! 主动与按需刷新（同一用户与提供商同时只有一个刷新在途）、断开时撤销。
//! 外部调用方只应通过 [`IntegrationService`] 使用本模块。

pub mod access_token;
pub mod authorization;
pub mod pkce;
pub mod refresh;
pub mod refresh_task;
pub mod revocation;
pub mod service;
pub mod state;
pub mod token_client;
pub mod token_store;

pub use access_token::{AccessTokenService, TokenFreshness};
pub use authorization::{
    AuthorizationFlow, AuthorizationPhase, AuthorizationRequest, CallbackOutcome,
};
pub use pkce::PkceVerifier;
pub use refresh::{RefreshCoordinator, RefreshPolicy, RefreshStatsSnapshot, SweepReport};
pub use refresh_task::{RefreshTask, TaskStats};
pub use revocation::{RevocationOutcome, RevocationService, TokenKind};
pub use service::{IntegrationService, IntegrationStatus, IntegrationSummary};
pub use state::{StateCodec, StatePayload};
pub use token_client::{TokenEndpointClient, TokenGrant};
pub use token_store::{TokenSet, TokenStore};
