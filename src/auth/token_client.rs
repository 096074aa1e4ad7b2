//! # 令牌端点客户端
//!
//! 授权码交换、刷新与撤销，统一使用 `application/x-www-form-urlencoded` POST。
//! 所有请求带超时；失败按 [`TokenEndpointError`] 分类，由调用方决定是否重试。

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::pkce::PkceVerifier;
use super::token_store::TokenSet;
use crate::error::{ConnectError, Result, TokenEndpointError};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::provider::{ClientAuthMethod, ProviderConfig};

/// 令牌端点原始响应
#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    scope: Option<String>,
    error: Option<String>,
}

/// 成功的授权结果
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// 有效期（秒），None 表示不过期
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TokenGrant {
    /// 以 `now` 为基准换算绝对过期时间
    #[must_use]
    pub fn into_token_set(self, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_at: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now + chrono::Duration::seconds(secs)),
            scope: self.scope.filter(|s| !s.is_empty()),
        }
    }

    fn from_body(status: u16, body: &str) -> std::result::Result<Self, TokenEndpointError> {
        let raw: RawTokenResponse = serde_json::from_str(body)
            .map_err(|e| TokenEndpointError::InvalidResponse(format!("not a token JSON: {e}")))?;

        if let Some(error) = raw.error {
            return Err(TokenEndpointError::Rejected {
                status,
                error: Some(error),
                body: body.to_string(),
            });
        }

        let access_token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TokenEndpointError::InvalidResponse("missing access_token".into()))?;

        let expires_in = match raw.expires_in {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            Some(_) => None,
        };

        Ok(Self {
            access_token,
            refresh_token: raw.refresh_token,
            expires_in,
            scope: raw.scope,
        })
    }
}

/// 解析 `Retry-After`：秒数或 HTTP 日期
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// 令牌端点客户端
#[derive(Debug, Clone)]
pub struct TokenEndpointClient {
    http_client: reqwest::Client,
}

impl TokenEndpointClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("career-connect/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConnectError::network_with_source("HTTP客户端创建失败", e))?;
        Ok(Self { http_client })
    }

    /// 授权码换取令牌
    pub async fn exchange_code(
        &self,
        config: &ProviderConfig,
        code: &str,
        verifier: Option<&PkceVerifier>,
    ) -> std::result::Result<TokenGrant, TokenEndpointError> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", config.redirect_uri.clone()),
        ];
        if let Some(verifier) = verifier {
            form.push(("code_verifier", verifier.as_str().to_string()));
        }
        let (status, body) = self.send_form(config, &config.token_url, form).await?;
        TokenGrant::from_body(status, &body)
    }

    /// 使用刷新令牌换取新的访问令牌
    pub async fn refresh(
        &self,
        config: &ProviderConfig,
        refresh_token: &str,
    ) -> std::result::Result<TokenGrant, TokenEndpointError> {
        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        let (status, body) = self.send_form(config, &config.token_url, form).await?;
        TokenGrant::from_body(status, &body)
    }

    /// 调用撤销端点
    pub async fn revoke(
        &self,
        revocation_url: &str,
        config: &ProviderConfig,
        token: &str,
        token_type_hint: &str,
    ) -> std::result::Result<(), TokenEndpointError> {
        let form = vec![
            ("token", token.to_string()),
            ("token_type_hint", token_type_hint.to_string()),
        ];
        self.send_form(config, revocation_url, form).await.map(|_| ())
    }

    /// 发送表单请求，非 2xx 响应转换为分类错误
    async fn send_form(
        &self,
        config: &ProviderConfig,
        url: &str,
        mut form: Vec<(&'static str, String)>,
    ) -> std::result::Result<(u16, String), TokenEndpointError> {
        let mut request = self.http_client.post(url).header(ACCEPT, "application/json");
        match config.client_auth {
            ClientAuthMethod::RequestBody => {
                form.push(("client_id", config.client_id.clone()));
                form.push(("client_secret", config.client_secret.clone()));
            }
            ClientAuthMethod::BasicAuth => {
                request = request.basic_auth(&config.client_id, Some(&config.client_secret));
            }
        }

        let response = request.form(&form).send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let body = response.text().await?;

        ldebug!(
            "system",
            LogStage::TokenExchange,
            LogComponent::TokenClient,
            "token_endpoint_response",
            "令牌端点已响应",
            provider_id = config.id,
            status = status
        );

        if (200..300).contains(&status) {
            Ok((status, body))
        } else {
            Err(TokenEndpointError::from_status(status, retry_after, body))
        }
    }
}
