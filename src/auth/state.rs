//! # 授权 state 编解码
//!
//! state 载荷序列化为 JSON 后经 AES-256-GCM 认证加密，再做 base64url 编码。
//! 认证加密同时防篡改并隐藏其中的 PKCE verifier。
//! 有效期内的重放仍然可能，回调侧不维护已用 nonce 集合。

use base64::engine::{Engine, general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::pkce::{PkceVerifier, is_valid_code_verifier};
use crate::config::TokenCrypto;
use crate::error::{ConnectError, Result, StateError};

/// state 有效期（毫秒）
pub const STATE_MAX_AGE_MS: i64 = 10 * 60 * 1000;
/// 允许的时钟偏差（毫秒）
pub const STATE_MAX_SKEW_MS: i64 = 30 * 1000;

const NONCE_BYTES: usize = 32;

/// 授权 state 载荷，只存在于授权往返过程中
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    pub user_id: String,
    pub provider_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub nonce: String,
    pub issued_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,
}

impl fmt::Debug for StatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatePayload")
            .field("user_id", &self.user_id)
            .field("provider_ids", &self.provider_ids)
            .field("group_id", &self.group_id)
            .field("issued_at_ms", &self.issued_at_ms)
            .field("has_pkce", &self.pkce_verifier.is_some())
            .finish_non_exhaustive()
    }
}

impl StatePayload {
    /// 新建载荷并生成 32 字节随机 nonce
    #[must_use]
    pub fn new(user_id: &str, provider_ids: Vec<String>, group_id: Option<String>) -> Self {
        let mut nonce = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self {
            user_id: user_id.to_string(),
            provider_ids,
            group_id,
            nonce: hex::encode(nonce),
            issued_at_ms: Utc::now().timestamp_millis(),
            pkce_verifier: None,
        }
    }

    /// 生成 PKCE verifier 并随 state 携带
    #[must_use]
    pub fn with_pkce(mut self) -> Self {
        self.pkce_verifier = Some(PkceVerifier::generate().into_string());
        self
    }

    #[must_use]
    pub fn verifier(&self) -> Option<PkceVerifier> {
        self.pkce_verifier
            .clone()
            .and_then(PkceVerifier::from_string)
    }

    fn check_consistency(&self) -> std::result::Result<(), StateError> {
        if self.user_id.is_empty() {
            return Err(StateError::Inconsistent("user_id is empty".into()));
        }
        if self.provider_ids.is_empty() || self.provider_ids.iter().any(String::is_empty) {
            return Err(StateError::Inconsistent("provider list is empty".into()));
        }
        if self.nonce.len() != NONCE_BYTES * 2 || hex::decode(&self.nonce).is_err() {
            return Err(StateError::Inconsistent("nonce is not 32 hex bytes".into()));
        }
        if self
            .pkce_verifier
            .as_deref()
            .is_some_and(|v| !is_valid_code_verifier(v))
        {
            return Err(StateError::Inconsistent("pkce verifier is invalid".into()));
        }
        Ok(())
    }
}

/// state 编解码器
#[derive(Debug, Clone)]
pub struct StateCodec {
    crypto: Arc<TokenCrypto>,
}

impl StateCodec {
    #[must_use]
    pub const fn new(crypto: Arc<TokenCrypto>) -> Self {
        Self { crypto }
    }

    /// 编码为不透明字符串
    pub fn encode(&self, payload: &StatePayload) -> Result<String> {
        let json = serde_json::to_vec(payload)?;
        let sealed = self.crypto.seal(&json).map_err(|e| {
            ConnectError::internal_with_source("授权 state 加密失败", anyhow::anyhow!("{e}"))
        })?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// 以指定时间作为签发时间编码
    pub fn encode_at(&self, mut payload: StatePayload, now: DateTime<Utc>) -> Result<String> {
        payload.issued_at_ms = now.timestamp_millis();
        self.encode(&payload)
    }

    pub fn decode(&self, opaque: &str) -> std::result::Result<StatePayload, StateError> {
        self.decode_at(opaque, Utc::now())
    }

    /// 解码并校验完整性、一致性与时效
    pub fn decode_at(
        &self,
        opaque: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<StatePayload, StateError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(opaque.trim())
            .map_err(|_| StateError::Malformed)?;
        let json = self.crypto.open(&sealed).map_err(|_| StateError::Tampered)?;
        let payload: StatePayload =
            serde_json::from_slice(&json).map_err(|_| StateError::Malformed)?;

        payload.check_consistency()?;

        let age_ms = now.timestamp_millis() - payload.issued_at_ms;
        if age_ms < -STATE_MAX_SKEW_MS {
            return Err(StateError::IssuedInFuture);
        }
        if age_ms > STATE_MAX_AGE_MS {
            return Err(StateError::Expired {
                age_seconds: age_ms / 1000,
            });
        }
        Ok(payload)
    }
}
