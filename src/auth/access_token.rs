//! # 访问令牌服务
//!
//! 数据抓取方获取可用令牌的唯一入口。临近过期时经由协调器刷新。

use chrono::{DateTime, Utc};
use entity::integrations;

use super::refresh::RefreshCoordinator;
use super::token_store::TokenStore;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, lwarn};

/// 令牌是否需要刷新
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFreshness {
    /// 无过期时间或距离过期超过缓冲期
    Fresh,
    /// 仍可用，但已进入刷新缓冲期
    ExpiringSoon,
    Expired,
}

impl TokenFreshness {
    #[must_use]
    pub fn of(record: &integrations::Model, now: DateTime<Utc>, buffer: chrono::Duration) -> Self {
        let Some(expires_at) = record.expires_at.map(|t| t.and_utc()) else {
            return Self::Fresh;
        };
        if now >= expires_at {
            Self::Expired
        } else if now > expires_at - buffer {
            Self::ExpiringSoon
        } else {
            Self::Fresh
        }
    }

    #[must_use]
    pub const fn needs_refresh(self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

#[derive(Debug, Clone)]
pub struct AccessTokenService {
    store: TokenStore,
    coordinator: RefreshCoordinator,
}

impl AccessTokenService {
    #[must_use]
    pub const fn new(store: TokenStore, coordinator: RefreshCoordinator) -> Self {
        Self { store, coordinator }
    }

    /// 返回可用的访问令牌；没有可用令牌时返回 None
    pub async fn get_access_token(&self, user_id: &str, provider_id: &str) -> Option<String> {
        let record = match self.store.read_integration(user_id, provider_id).await {
            Ok(Some(record)) if record.is_active => record,
            Ok(_) => return None,
            Err(e) => {
                lerror!(
                    user_id,
                    LogStage::Db,
                    LogComponent::AccessToken,
                    "read_failed",
                    "读取集成记录失败",
                    provider_id = provider_id,
                    error = e.to_string()
                );
                return None;
            }
        };

        let freshness =
            TokenFreshness::of(&record, Utc::now(), self.coordinator.policy().refresh_buffer);

        if freshness.needs_refresh() {
            if !record.has_refresh_token() {
                // 无刷新令牌：已过期直接返回 None，不发起网络请求
                if freshness == TokenFreshness::Expired {
                    ldebug!(
                        user_id,
                        LogStage::Refresh,
                        LogComponent::AccessToken,
                        "expired_without_refresh_token",
                        "令牌已过期且无刷新令牌",
                        provider_id = provider_id
                    );
                    return None;
                }
            } else if let Some(token) = self.coordinator.refresh(user_id, provider_id).await {
                return Some(token);
            } else if freshness == TokenFreshness::Expired {
                return None;
            }
        }

        self.reveal(&record)
    }

    fn reveal(&self, record: &integrations::Model) -> Option<String> {
        match self.store.reveal_access_token(record) {
            Ok(token) => Some(token),
            Err(e) => {
                lwarn!(
                    record.user_id,
                    LogStage::Internal,
                    LogComponent::AccessToken,
                    "access_token_unreadable",
                    "访问令牌无法解密，需要重新授权",
                    provider_id = record.provider_id,
                    error = e.to_string()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: Option<DateTime<Utc>>) -> integrations::Model {
        let now = Utc::now().naive_utc();
        integrations::Model {
            id: 1,
            user_id: "u".into(),
            provider_id: "github".into(),
            access_token: String::new(),
            refresh_token: None,
            expires_at: expires_at.map(|t| t.naive_utc()),
            scope: None,
            is_active: true,
            is_connected: true,
            connected_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_freshness_boundaries() {
        let now = Utc::now();
        let buffer = Duration::minutes(5);

        assert_eq!(TokenFreshness::of(&record(None), now, buffer), TokenFreshness::Fresh);
        assert_eq!(
            TokenFreshness::of(&record(Some(now + Duration::minutes(6))), now, buffer),
            TokenFreshness::Fresh
        );
        assert_eq!(
            TokenFreshness::of(&record(Some(now + Duration::minutes(4))), now, buffer),
            TokenFreshness::ExpiringSoon
        );
        assert_eq!(
            TokenFreshness::of(&record(Some(now - Duration::seconds(1))), now, buffer),
            TokenFreshness::Expired
        );
        assert!(TokenFreshness::Expired.needs_refresh());
        assert!(!TokenFreshness::Fresh.needs_refresh());
    }
}
