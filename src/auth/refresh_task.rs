//! # 令牌主动刷新后台任务
//!
//! 定期扫描即将过期的令牌并经由协调器刷新，与按需刷新共用在途表。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::refresh::{RefreshCoordinator, SweepReport};
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 任务统计信息
#[derive(Debug, Default, Clone, Serialize)]
pub struct TaskStats {
    pub total_executions: u64,
    pub failed_executions: u64,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub last_report: Option<SweepReport>,
}

/// 后台刷新任务句柄
#[derive(Debug)]
pub struct RefreshTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    stats: Arc<RwLock<TaskStats>>,
}

impl RefreshTask {
    /// 启动任务；`cancel` 取消后在当前扫描结束时退出
    #[must_use]
    pub fn spawn(
        coordinator: RefreshCoordinator,
        period: Duration,
        window: chrono::Duration,
        cancel: CancellationToken,
    ) -> Self {
        let stats = Arc::new(RwLock::new(TaskStats::default()));
        let task_stats = Arc::clone(&stats);
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            linfo!(
                "system",
                LogStage::BackgroundTask,
                LogComponent::Refresh,
                "refresh_task_started",
                "主动刷新任务已启动",
                period_secs = period.as_secs(),
                window_minutes = window.num_minutes()
            );

            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = coordinator.refresh_expiring(window).await;
                let mut stats = task_stats.write().await;
                stats.total_executions += 1;
                stats.last_execution_time = Some(Utc::now());
                match result {
                    Ok(report) => stats.last_report = Some(report),
                    Err(e) => {
                        stats.failed_executions += 1;
                        lwarn!(
                            "system",
                            LogStage::BackgroundTask,
                            LogComponent::Refresh,
                            "sweep_failed",
                            "主动刷新扫描失败",
                            error = e.to_string()
                        );
                    }
                }
            }

            linfo!(
                "system",
                LogStage::Shutdown,
                LogComponent::Refresh,
                "refresh_task_stopped",
                "主动刷新任务已停止"
            );
        });

        Self {
            cancel,
            handle,
            stats,
        }
    }

    pub async fn stats(&self) -> TaskStats {
        self.stats.read().await.clone()
    }

    /// 取消并等待任务退出
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            lwarn!(
                "system",
                LogStage::Shutdown,
                LogComponent::Refresh,
                "refresh_task_join_failed",
                "主动刷新任务异常退出",
                error = e.to_string()
            );
        }
    }
}
