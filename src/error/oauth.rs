//! OAuth 流程相关错误：授权 state 与令牌端点

use std::time::Duration;
use thiserror::Error;

/// 授权 `state` 被拒绝的原因
///
/// 所有变体都是终止性的，用户需要重新发起授权。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state is not decodable")]
    Malformed,

    #[error("state failed authentication")]
    Tampered,

    #[error("state payload is inconsistent: {0}")]
    Inconsistent(String),

    #[error("state expired {age_seconds}s after issue")]
    Expired { age_seconds: i64 },

    #[error("state was issued in the future")]
    IssuedInFuture,

    #[error("authorization was denied by the provider: {0}")]
    Denied(String),
}

/// 令牌端点或撤销端点的失败
///
/// 响应体只用于日志，不出现在 `Display` 中。
#[derive(Debug, Clone, Error)]
pub enum TokenEndpointError {
    #[error("provider rejected the grant (HTTP {status}, error={error:?})")]
    Rejected {
        status: u16,
        error: Option<String>,
        body: String,
    },

    #[error("provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider server error (HTTP {status})")]
    Server { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

impl TokenEndpointError {
    /// 按非 2xx 状态码分类
    #[must_use]
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            408 => Self::Timeout,
            500..=599 => Self::Server { status, body },
            _ => {
                let error = extract_error_code(&body);
                Self::Rejected {
                    status,
                    error,
                    body,
                }
            }
        }
    }

    /// 终止性失败：授权已失效或被撤销，重试无意义
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::InvalidResponse(_))
    }

    /// 暂时性失败，在重试策略内重试
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !self.is_terminal()
    }

    /// 提供商返回的 HTTP 状态码
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Timeout | Self::Transport(_) | Self::InvalidResponse(_) => None,
        }
    }

    /// 服务端要求的重试等待时间
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// 原始响应体，仅用于日志
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Rejected { body, .. } | Self::Server { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TokenEndpointError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// 解析 `{"error": "invalid_grant", ...}` 形式的响应体
fn extract_error_code(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(ToString::to_string)
}
