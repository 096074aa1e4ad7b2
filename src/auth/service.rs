//! # 集成服务
//!
//! 对外的统一入口：获取令牌、发起授权、处理回调、断开与校验。

use chrono::{DateTime, Utc};
use entity::integrations;
use serde::Serialize;
use std::sync::Arc;

use super::access_token::AccessTokenService;
use super::authorization::{AuthorizationFlow, AuthorizationRequest, CallbackOutcome};
use super::revocation::{RevocationOutcome, RevocationService, TokenKind};
use super::token_store::TokenStore;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::provider::ProviderRegistry;
use crate::{lerror, linfo, lwarn};

/// 集成的可用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Connected,
    NeedsReconnect,
    NotConnected,
    /// 提供商未配置凭据
    Unavailable,
}

/// 不含令牌的集成摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationSummary {
    pub provider_id: String,
    pub status: IntegrationStatus,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IntegrationService {
    registry: Arc<ProviderRegistry>,
    store: TokenStore,
    access_tokens: AccessTokenService,
    authorization: AuthorizationFlow,
    revocation: RevocationService,
}

impl IntegrationService {
    #[must_use]
    pub const fn new(
        registry: Arc<ProviderRegistry>,
        store: TokenStore,
        access_tokens: AccessTokenService,
        authorization: AuthorizationFlow,
        revocation: RevocationService,
    ) -> Self {
        Self {
            registry,
            store,
            access_tokens,
            authorization,
            revocation,
        }
    }

    pub async fn get_access_token(&self, user_id: &str, provider_id: &str) -> Option<String> {
        self.access_tokens.get_access_token(user_id, provider_id).await
    }

    pub fn begin_authorization(
        &self,
        user_id: &str,
        provider_or_group: &str,
    ) -> Result<AuthorizationRequest> {
        self.authorization
            .begin_authorization(user_id, provider_or_group)
    }

    pub async fn handle_callback(&self, code: &str, state: &str) -> CallbackOutcome {
        self.authorization.handle_callback(code, state).await
    }

    pub fn handle_denied(&self, state: &str, error: &str) -> CallbackOutcome {
        self.authorization.handle_denied(state, error)
    }

    /// 断开连接：尽力撤销后软删除。返回是否有活跃集成被断开
    pub async fn disconnect(&self, user_id: &str, provider_id: &str) -> Result<bool> {
        let Some(record) = self.store.read_integration(user_id, provider_id).await? else {
            return Ok(false);
        };
        if !record.is_active {
            return Ok(false);
        }

        let revocation = match self.revocable_token(&record) {
            Some((token, kind)) => {
                self.revocation
                    .revoke(user_id, provider_id, &token, kind)
                    .await
            }
            None => RevocationOutcome::Unsupported,
        };

        let deactivated = self.store.deactivate(user_id, provider_id).await?;
        linfo!(
            user_id,
            LogStage::Revocation,
            LogComponent::Integration,
            "disconnected",
            "集成已断开",
            provider_id = provider_id,
            revocation = revocation
        );
        Ok(deactivated)
    }

    /// 校验集成当前是否可用；必要时会触发刷新
    pub async fn validate_integration(&self, user_id: &str, provider_id: &str) -> IntegrationStatus {
        if !self.registry.is_available(provider_id) {
            return IntegrationStatus::Unavailable;
        }
        let record = match self.store.read_integration(user_id, provider_id).await {
            Ok(Some(record)) if record.is_active => record,
            Ok(_) => return IntegrationStatus::NotConnected,
            Err(e) => {
                lerror!(
                    user_id,
                    LogStage::Db,
                    LogComponent::Integration,
                    "validate_read_failed",
                    "读取集成记录失败",
                    provider_id = provider_id,
                    error = e.to_string()
                );
                return IntegrationStatus::NotConnected;
            }
        };
        if !record.is_connected {
            return IntegrationStatus::NeedsReconnect;
        }

        if self.get_access_token(user_id, provider_id).await.is_some() {
            IntegrationStatus::Connected
        } else {
            IntegrationStatus::NeedsReconnect
        }
    }

    /// 列出用户的集成（不发起网络请求）
    pub async fn list_integrations(&self, user_id: &str) -> Result<Vec<IntegrationSummary>> {
        let records = self.store.list_integrations(user_id).await?;
        let now = Utc::now().naive_utc();
        Ok(records
            .into_iter()
            .map(|record| {
                let status = if !self.registry.is_available(&record.provider_id) {
                    IntegrationStatus::Unavailable
                } else if !record.is_active {
                    IntegrationStatus::NotConnected
                } else if !record.is_connected
                    || (record.is_expired_at(now) && !record.has_refresh_token())
                {
                    IntegrationStatus::NeedsReconnect
                } else {
                    IntegrationStatus::Connected
                };
                IntegrationSummary {
                    status,
                    scope: record.scope,
                    expires_at: record.expires_at.map(|t| t.and_utc()),
                    connected_at: record.connected_at.and_utc(),
                    updated_at: record.updated_at.and_utc(),
                    provider_id: record.provider_id,
                }
            })
            .collect())
    }

    #[must_use]
    pub fn available_providers(&self) -> Vec<String> {
        self.registry.list_available()
    }

    /// 优先撤销刷新令牌（多数提供商会连带撤销访问令牌）
    fn revocable_token(&self, record: &integrations::Model) -> Option<(String, TokenKind)> {
        match self.store.reveal_refresh_token(record) {
            Ok(Some(token)) => return Some((token, TokenKind::RefreshToken)),
            Ok(None) => {}
            Err(e) => lwarn!(
                record.user_id,
                LogStage::Revocation,
                LogComponent::Integration,
                "refresh_token_unreadable",
                "刷新令牌无法解密，尝试撤销访问令牌",
                provider_id = record.provider_id,
                error = e.to_string()
            ),
        }
        match self.store.reveal_access_token(record) {
            Ok(token) => Some((token, TokenKind::AccessToken)),
            Err(e) => {
                lwarn!(
                    record.user_id,
                    LogStage::Revocation,
                    LogComponent::Integration,
                    "access_token_unreadable",
                    "访问令牌无法解密，跳过撤销",
                    provider_id = record.provider_id,
                    error = e.to_string()
                );
                None
            }
        }
    }
}
