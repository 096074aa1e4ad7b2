//! # 令牌刷新协调器
//!
//! 同一 `(user_id, provider_id)` 任意时刻最多只有一个刷新请求在途。
//! 在途表以 `"{user_id}:{provider_id}"` 为键，值为可共享的刷新 future；
//! 刷新在独立任务中执行，调用方放弃等待不会中断刷新。
//! 在途表是进程内的，多节点部署需要持久化租约。

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::token_client::TokenEndpointClient;
use super::token_store::TokenStore;
use crate::config::RefreshConfig;
use crate::error::{Result, TokenEndpointError};
use crate::logging::{LogComponent, LogStage};
use crate::provider::ProviderRegistry;
use crate::{ldebug, lerror, linfo, lwarn};

const SWEEP_CONCURRENCY: usize = 4;

/// 刷新重试策略
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_retry_after: Duration,
    /// 过期前多久开始主动刷新
    pub refresh_buffer: chrono::Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_retry_after: Duration::from_secs(60),
            refresh_buffer: chrono::Duration::minutes(5),
        }
    }
}

impl From<&RefreshConfig> for RefreshPolicy {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_retry_after: Duration::from_secs(config.max_retry_after_seconds),
            refresh_buffer: chrono::Duration::minutes(config.buffer_minutes),
        }
    }
}

impl RefreshPolicy {
    /// 第 `attempt` 次失败后的指数退避：base, 2*base, 4*base...
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// 429 优先使用 `Retry-After`（有上限），否则指数退避
    #[must_use]
    pub fn retry_delay(&self, error: &TokenEndpointError, attempt: u32) -> Duration {
        error.retry_after().map_or_else(
            || self.backoff_delay(attempt),
            |delay| delay.min(self.max_retry_after),
        )
    }
}

/// 刷新计数器
#[derive(Debug, Default)]
pub struct RefreshStats {
    started: AtomicU64,
    joined: AtomicU64,
    succeeded: AtomicU64,
    terminal_failures: AtomicU64,
    exhausted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStatsSnapshot {
    /// 实际发起的刷新
    pub started: u64,
    /// 复用在途刷新的调用
    pub joined: u64,
    pub succeeded: u64,
    pub terminal_failures: u64,
    pub exhausted: u64,
}

impl RefreshStats {
    #[must_use]
    pub fn snapshot(&self) -> RefreshStatsSnapshot {
        RefreshStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            terminal_failures: self.terminal_failures.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 一次主动扫描的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub refreshed: usize,
    pub failed: usize,
}

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

struct Inner {
    store: TokenStore,
    registry: Arc<ProviderRegistry>,
    client: TokenEndpointClient,
    policy: RefreshPolicy,
    in_flight: DashMap<String, SharedRefresh>,
    stats: RefreshStats,
}

/// 任务结束（包括 panic）时移除在途表项
struct InFlightGuard {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.key);
    }
}

/// 进程级刷新协调器，启动时构建一次并共享
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("policy", &self.inner.policy)
            .field("in_flight", &self.inner.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(
        store: TokenStore,
        registry: Arc<ProviderRegistry>,
        client: TokenEndpointClient,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                client,
                policy,
                in_flight: DashMap::new(),
                stats: RefreshStats::default(),
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RefreshPolicy {
        &self.inner.policy
    }

    #[must_use]
    pub fn stats(&self) -> RefreshStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// 当前在途刷新数量
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// 刷新访问令牌；同一键的并发调用共享同一次网络请求
    pub async fn refresh(&self, user_id: &str, provider_id: &str) -> Option<String> {
        let key = format!("{user_id}:{provider_id}");
        let shared = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                RefreshStats::bump(&self.inner.stats.joined);
                ldebug!(
                    user_id,
                    LogStage::Refresh,
                    LogComponent::Refresh,
                    "refresh_joined",
                    "复用在途刷新",
                    provider_id = provider_id
                );
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                RefreshStats::bump(&self.inner.stats.started);
                let shared = self.spawn_refresh(key, user_id.to_string(), provider_id.to_string());
                entry.insert(shared.clone());
                shared
            }
        };
        shared.await
    }

    fn spawn_refresh(&self, key: String, user_id: String, provider_id: String) -> SharedRefresh {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _guard = InFlightGuard {
                inner: Arc::clone(&inner),
                key,
            };
            inner.do_refresh(&user_id, &provider_id).await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    lerror!(
                        "system",
                        LogStage::Refresh,
                        LogComponent::Refresh,
                        "refresh_task_failed",
                        "刷新任务异常退出",
                        error = e.to_string()
                    );
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// 主动刷新将在 `window` 内过期的令牌
    pub async fn refresh_expiring(&self, window: chrono::Duration) -> Result<SweepReport> {
        let cutoff = Utc::now() + window;
        let candidates = self.inner.store.find_expiring(cutoff).await?;
        let scanned = candidates.len();

        let outcomes: Vec<bool> = stream::iter(candidates)
            .map(|record| async move {
                self.refresh(&record.user_id, &record.provider_id)
                    .await
                    .is_some()
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        let refreshed = outcomes.iter().filter(|ok| **ok).count();
        let report = SweepReport {
            scanned,
            refreshed,
            failed: scanned - refreshed,
        };
        if scanned > 0 {
            linfo!(
                "system",
                LogStage::BackgroundTask,
                LogComponent::Refresh,
                "sweep_completed",
                "主动刷新扫描完成",
                scanned = report.scanned,
                refreshed = report.refreshed,
                failed = report.failed
            );
        }
        Ok(report)
    }
}

impl Inner {
    /// 单次刷新流程，所有失败都折叠为 None
    async fn do_refresh(&self, user_id: &str, provider_id: &str) -> Option<String> {
        let record = match self.store.read_integration(user_id, provider_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                lerror!(
                    user_id,
                    LogStage::Refresh,
                    LogComponent::Refresh,
                    "refresh_read_failed",
                    "读取集成记录失败",
                    provider_id = provider_id,
                    error = e.to_string()
                );
                return None;
            }
        };
        if !record.is_usable() {
            return None;
        }

        let refresh_token = match self.store.reveal_refresh_token(&record) {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                lwarn!(
                    user_id,
                    LogStage::Refresh,
                    LogComponent::Refresh,
                    "refresh_token_unreadable",
                    "刷新令牌无法解密，需要重新授权",
                    provider_id = provider_id,
                    error = e.to_string()
                );
                return None;
            }
        };

        let Some(config) = self.registry.get(provider_id) else {
            lwarn!(
                user_id,
                LogStage::Refresh,
                LogComponent::Refresh,
                "provider_unavailable",
                "提供商未配置，跳过刷新",
                provider_id = provider_id
            );
            return None;
        };

        let max_attempts = self.policy.max_attempts;
        for attempt in 1..=max_attempts {
            match self.client.refresh(config, &refresh_token).await {
                Ok(grant) => {
                    RefreshStats::bump(&self.stats.succeeded);
                    let tokens = grant.into_token_set(Utc::now());
                    let access_token = tokens.access_token.clone();
                    match self.store.update_refreshed(user_id, provider_id, &tokens).await {
                        Ok(true) => {}
                        Ok(false) => {
                            // 刷新期间集成已断开或被标记为需要重新授权
                            lwarn!(
                                user_id,
                                LogStage::Refresh,
                                LogComponent::Refresh,
                                "refresh_discarded",
                                "集成已不可用，丢弃刷新结果",
                                provider_id = provider_id
                            );
                            return None;
                        }
                        Err(e) => {
                            lerror!(
                                user_id,
                                LogStage::Refresh,
                                LogComponent::Refresh,
                                "refresh_store_failed",
                                "刷新成功但保存失败",
                                provider_id = provider_id,
                                error = e.to_string()
                            );
                        }
                    }
                    linfo!(
                        user_id,
                        LogStage::Refresh,
                        LogComponent::Refresh,
                        "refresh_succeeded",
                        "令牌刷新成功",
                        provider_id = provider_id,
                        attempt = attempt,
                        rotated = tokens.refresh_token.is_some(),
                        expires_at = tokens.expires_at
                    );
                    return Some(access_token);
                }
                Err(error) if error.is_terminal() => {
                    RefreshStats::bump(&self.stats.terminal_failures);
                    lwarn!(
                        user_id,
                        LogStage::Refresh,
                        LogComponent::Refresh,
                        "refresh_rejected",
                        "刷新被拒绝，需要重新授权",
                        provider_id = provider_id,
                        attempt = attempt,
                        status = error.status(),
                        error = error.to_string(),
                        body = error.body()
                    );
                    if let Err(e) = self.store.mark_needs_reconnect(user_id, provider_id).await {
                        lerror!(
                            user_id,
                            LogStage::Refresh,
                            LogComponent::Refresh,
                            "mark_reconnect_failed",
                            "标记重新授权失败",
                            provider_id = provider_id,
                            error = e.to_string()
                        );
                    }
                    return None;
                }
                Err(error) => {
                    if attempt == max_attempts {
                        lwarn!(
                            user_id,
                            LogStage::Refresh,
                            LogComponent::Refresh,
                            "refresh_attempt_failed",
                            "刷新失败，重试次数已用尽",
                            provider_id = provider_id,
                            attempt = attempt,
                            status = error.status(),
                            error = error.to_string()
                        );
                        break;
                    }
                    let delay = self.policy.retry_delay(&error, attempt);
                    lwarn!(
                        user_id,
                        LogStage::Refresh,
                        LogComponent::Refresh,
                        "refresh_attempt_failed",
                        "刷新暂时失败，稍后重试",
                        provider_id = provider_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis(),
                        status = error.status(),
                        error = error.to_string()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        RefreshStats::bump(&self.stats.exhausted);
        lerror!(
            user_id,
            LogStage::Refresh,
            LogComponent::Refresh,
            "refresh_exhausted",
            "令牌刷新失败，保留原刷新令牌",
            provider_id = provider_id,
            attempts = max_attempts
        );
        None
    }
}
