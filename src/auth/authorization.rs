//! # 授权流程
//!
//! `Initiated → CallbackReceived → Connected | Rejected`
//!
//! 分组提供商（共享一个 OAuth 应用）一次授权、一次交换，
//! 在同一事务中为组内每个成员保存令牌。

use chrono::Utc;
use std::sync::Arc;
use url::Url;

use super::pkce::CHALLENGE_METHOD;
use super::state::{StateCodec, StatePayload};
use super::token_client::TokenEndpointClient;
use super::token_store::TokenStore;
use crate::error::{Context, ConnectError, Result, StateError};
use crate::logging::{LogComponent, LogStage};
use crate::provider::{ProviderConfig, ProviderRegistry};
use crate::{linfo, lwarn};

/// 授权流程所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationPhase {
    Initiated,
    CallbackReceived,
    Connected,
    Rejected,
}

impl AuthorizationPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::CallbackReceived => "callback_received",
            Self::Connected => "connected",
            Self::Rejected => "rejected",
        }
    }
}

/// 发往浏览器的授权请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub provider_ids: Vec<String>,
}

/// 回调处理结果
#[derive(Debug)]
pub enum CallbackOutcome {
    Connected {
        user_id: String,
        provider_ids: Vec<String>,
    },
    /// state 无效或用户拒绝授权，需要从头开始
    Rejected(StateError),
    /// 交换或保存失败
    Failed {
        user_id: String,
        provider_ids: Vec<String>,
        error: ConnectError,
    },
}

impl CallbackOutcome {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    #[must_use]
    pub const fn phase(&self) -> AuthorizationPhase {
        match self {
            Self::Connected { .. } => AuthorizationPhase::Connected,
            Self::Rejected(_) | Self::Failed { .. } => AuthorizationPhase::Rejected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    registry: Arc<ProviderRegistry>,
    codec: StateCodec,
    client: TokenEndpointClient,
    store: TokenStore,
}

impl AuthorizationFlow {
    #[must_use]
    pub const fn new(
        registry: Arc<ProviderRegistry>,
        codec: StateCodec,
        client: TokenEndpointClient,
        store: TokenStore,
    ) -> Self {
        Self {
            registry,
            codec,
            client,
            store,
        }
    }

    /// 为单个提供商或提供商组构建授权 URL
    pub fn begin_authorization(
        &self,
        user_id: &str,
        provider_or_group: &str,
    ) -> Result<AuthorizationRequest> {
        let members = self.registry.resolve_target(provider_or_group);
        let Some(primary) = members.first().copied() else {
            return Err(ConnectError::provider_unavailable(provider_or_group));
        };

        let is_group = !self.registry.is_available(provider_or_group);
        let provider_ids: Vec<String> = members.iter().map(|p| p.id.clone()).collect();
        let group_id = is_group.then(|| provider_or_group.to_string());

        let mut payload = StatePayload::new(user_id, provider_ids.clone(), group_id);
        if primary.supports_pkce {
            payload = payload.with_pkce();
        }
        let state = self.codec.encode(&payload)?;

        let url = build_authorization_url(primary, &merge_scopes(&members), &state, &payload)?;

        linfo!(
            user_id,
            LogStage::Authorization,
            LogComponent::Authorization,
            AuthorizationPhase::Initiated.as_str(),
            "授权流程已开始",
            requested = provider_or_group,
            provider_ids = provider_ids,
            pkce = payload.pkce_verifier.is_some()
        );

        Ok(AuthorizationRequest {
            url,
            state,
            provider_ids,
        })
    }

    /// 处理提供商回调：校验 state、交换授权码、保存令牌
    pub async fn handle_callback(&self, code: &str, state: &str) -> CallbackOutcome {
        let payload = match self.codec.decode(state) {
            Ok(payload) => payload,
            Err(error) => return reject("unknown", error),
        };
        let user_id = payload.user_id.clone();
        let provider_ids = payload.provider_ids.clone();

        linfo!(
            user_id,
            LogStage::Callback,
            LogComponent::Authorization,
            AuthorizationPhase::CallbackReceived.as_str(),
            "收到授权回调",
            provider_ids = provider_ids
        );

        match self.complete(code, &payload).await {
            Ok(()) => {
                linfo!(
                    user_id,
                    LogStage::Callback,
                    LogComponent::Authorization,
                    AuthorizationPhase::Connected.as_str(),
                    "集成已连接",
                    provider_ids = provider_ids
                );
                CallbackOutcome::Connected {
                    user_id,
                    provider_ids,
                }
            }
            Err(error) => {
                lwarn!(
                    user_id,
                    LogStage::Callback,
                    LogComponent::Authorization,
                    AuthorizationPhase::Rejected.as_str(),
                    "授权回调处理失败",
                    provider_ids = provider_ids,
                    error = error.to_string(),
                    body = exchange_body(&error)
                );
                CallbackOutcome::Failed {
                    user_id,
                    provider_ids,
                    error,
                }
            }
        }
    }

    /// 提供商回调中带有 `error` 参数（用户拒绝授权等）
    pub fn handle_denied(&self, state: &str, error: &str) -> CallbackOutcome {
        match self.codec.decode(state) {
            Ok(payload) => reject(&payload.user_id, StateError::Denied(error.to_string())),
            Err(state_error) => reject("unknown", state_error),
        }
    }

    async fn complete(&self, code: &str, payload: &StatePayload) -> Result<()> {
        // 部分提供商会在 code 后附带 fragment
        let code = code.split('#').next().unwrap_or(code).trim();
        if code.is_empty() {
            return Err(ConnectError::internal("回调缺少授权码"));
        }

        let configs = payload
            .provider_ids
            .iter()
            .map(|id| {
                self.registry
                    .get(id)
                    .ok_or_else(|| ConnectError::provider_unavailable(id.as_str()))
            })
            .collect::<Result<Vec<&ProviderConfig>>>()?;
        let primary = configs[0];

        let grant = self
            .client
            .exchange_code(primary, code, payload.verifier().as_ref())
            .await
            .with_context(|| format!("授权码交换失败: provider={}", primary.id))?;
        let tokens = grant.into_token_set(Utc::now());

        if payload.provider_ids.len() == 1 {
            self.store
                .store_tokens(&payload.user_id, &primary.id, &tokens)
                .await
        } else {
            self.store
                .store_tokens_for_group(&payload.user_id, &payload.provider_ids, &tokens)
                .await
        }
    }
}

fn reject(user_id: &str, error: StateError) -> CallbackOutcome {
    lwarn!(
        user_id,
        LogStage::Callback,
        LogComponent::Authorization,
        AuthorizationPhase::Rejected.as_str(),
        "授权被拒绝，需要重新开始",
        reason = error.to_string()
    );
    CallbackOutcome::Rejected(error)
}

/// 提供商返回的错误响应体，仅用于日志
fn exchange_body(error: &ConnectError) -> Option<String> {
    match error {
        ConnectError::TokenExchange(e) => e.body().map(ToString::to_string),
        ConnectError::Context { source, .. } => exchange_body(source),
        _ => None,
    }
}

/// 合并组内成员的 scope，保持首次出现顺序
fn merge_scopes(members: &[&ProviderConfig]) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for scope in members.iter().flat_map(|p| p.scopes.iter()) {
        if !scopes.contains(scope) {
            scopes.push(scope.clone());
        }
    }
    scopes
}

fn build_authorization_url(
    config: &ProviderConfig,
    scopes: &[String],
    state: &str,
    payload: &StatePayload,
) -> Result<String> {
    let mut url = Url::parse(&config.authorization_url)
        .with_context(|| format!("授权地址无效: {}", config.authorization_url))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("response_type", "code");
        if !scopes.is_empty() {
            query.append_pair("scope", &config.scope_delimiter.join(scopes));
        }
        query.append_pair("state", state);
        if let Some(verifier) = payload.verifier() {
            query
                .append_pair("code_challenge", &verifier.challenge())
                .append_pair("code_challenge_method", CHALLENGE_METHOD);
        }
        for (key, value) in config.extras.params() {
            query.append_pair(key, value);
        }
    }
    Ok(url.into())
}
