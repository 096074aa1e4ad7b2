//! # 令牌撤销
//!
//! 断开连接时尽力撤销提供商侧的授权，结果只记录日志，从不返回错误。

use std::sync::Arc;

use super::token_client::TokenEndpointClient;
use crate::logging::{LogComponent, LogStage};
use crate::provider::ProviderRegistry;
use crate::{ldebug, linfo, lwarn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationOutcome {
    Revoked,
    /// 提供商没有撤销端点（或未配置）
    Unsupported,
    Failed,
}

/// 撤销时附带的令牌类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    AccessToken,
    RefreshToken,
}

impl TokenKind {
    #[must_use]
    pub const fn hint(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevocationService {
    registry: Arc<ProviderRegistry>,
    client: TokenEndpointClient,
}

impl RevocationService {
    #[must_use]
    pub const fn new(registry: Arc<ProviderRegistry>, client: TokenEndpointClient) -> Self {
        Self { registry, client }
    }

    pub async fn revoke(
        &self,
        user_id: &str,
        provider_id: &str,
        token: &str,
        kind: TokenKind,
    ) -> RevocationOutcome {
        let Some(config) = self.registry.get(provider_id) else {
            return RevocationOutcome::Unsupported;
        };
        let Some(revocation_url) = config.revocation_url.as_deref() else {
            ldebug!(
                user_id,
                LogStage::Revocation,
                LogComponent::Revocation,
                "revocation_unsupported",
                "提供商不支持令牌撤销",
                provider_id = provider_id
            );
            return RevocationOutcome::Unsupported;
        };

        match self
            .client
            .revoke(revocation_url, config, token, kind.hint())
            .await
        {
            Ok(()) => {
                linfo!(
                    user_id,
                    LogStage::Revocation,
                    LogComponent::Revocation,
                    "token_revoked",
                    "令牌已撤销",
                    provider_id = provider_id,
                    token_kind = kind.hint()
                );
                RevocationOutcome::Revoked
            }
            Err(error) => {
                lwarn!(
                    user_id,
                    LogStage::Revocation,
                    LogComponent::Revocation,
                    "revocation_failed",
                    "令牌撤销失败，继续断开连接",
                    provider_id = provider_id,
                    status = error.status(),
                    error = error.to_string()
                );
                RevocationOutcome::Failed
            }
        }
    }
}
