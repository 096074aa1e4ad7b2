//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 刷新提前量与扫描窗口的上限（分钟）
const MAX_REFRESH_WINDOW_MINUTES: i64 = 24 * 60;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 数据库配置
    pub database: super::DatabaseConfig,
    /// OAuth 相关配置
    pub oauth: OAuthConfig,
    /// 令牌刷新策略
    pub refresh: RefreshConfig,
}

/// OAuth 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// 对外可访问的服务地址，用于拼接默认回调地址
    pub public_base_url: String,
    /// 调用提供商端点的超时时间（秒）
    pub http_timeout_seconds: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            http_timeout_seconds: 15,
        }
    }
}

impl OAuthConfig {
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

/// 刷新配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// 过期前多少分钟开始主动刷新
    pub buffer_minutes: i64,
    /// 单次刷新的最大尝试次数
    pub max_attempts: u32,
    /// 指数退避的基础延迟（毫秒）
    pub base_delay_ms: u64,
    /// Retry-After 的上限（秒）
    pub max_retry_after_seconds: u64,
    /// 后台扫描间隔（秒），0 表示关闭
    pub sweep_interval_seconds: u64,
    /// 后台扫描的提前窗口（分钟）
    pub sweep_window_minutes: i64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: 5,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_retry_after_seconds: 60,
            sweep_interval_seconds: 300,
            sweep_window_minutes: 10,
        }
    }
}

impl RefreshConfig {
    #[must_use]
    pub const fn sweep_enabled(&self) -> bool {
        self.sweep_interval_seconds > 0
    }
}

impl AppConfig {
    /// 验证配置有效性
    pub fn validate(&self) -> crate::error::Result<()> {
        crate::ensure_config!(!self.database.url.is_empty(), "数据库URL不能为空");
        crate::ensure_config!(
            self.database.max_connections > 0,
            "数据库最大连接数必须大于0"
        );

        let base = url::Url::parse(&self.oauth.public_base_url).map_err(|e| {
            crate::error::ConnectError::config_with_source(
                format!("public_base_url 格式错误: {}", self.oauth.public_base_url),
                e,
            )
        })?;
        crate::ensure_config!(
            matches!(base.scheme(), "http" | "https"),
            "public_base_url 必须是 http(s) 地址"
        );
        crate::ensure_config!(
            self.oauth.http_timeout_seconds > 0,
            "HTTP 超时时间必须大于0"
        );

        crate::ensure_config!(self.refresh.max_attempts > 0, "刷新尝试次数必须大于0");
        crate::ensure_config!(
            (0..=MAX_REFRESH_WINDOW_MINUTES).contains(&self.refresh.buffer_minutes),
            "刷新提前量必须在 0 到 {} 分钟之间",
            MAX_REFRESH_WINDOW_MINUTES
        );
        crate::ensure_config!(
            self.refresh.sweep_window_minutes <= MAX_REFRESH_WINDOW_MINUTES,
            "扫描窗口不能超过 {} 分钟",
            MAX_REFRESH_WINDOW_MINUTES
        );
        crate::ensure_config!(
            self.refresh.sweep_window_minutes >= self.refresh.buffer_minutes,
            "扫描窗口({})不能小于刷新提前量({})",
            self.refresh.sweep_window_minutes,
            self.refresh.buffer_minutes
        );
        Ok(())
    }
}
