//! # 日志配置模块
//!
//! 统一的结构化日志：每条日志带有主体、阶段、组件和操作名。
//! 令牌、客户端密钥和 PKCE verifier 永远不作为字段写入日志。

use std::env;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 日志所处的生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Shutdown,
    Authorization,
    Callback,
    TokenExchange,
    Refresh,
    Revocation,
    Db,
    BackgroundTask,
    Error,
    Internal,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Authorization => "authorization",
            Self::Callback => "callback",
            Self::TokenExchange => "token_exchange",
            Self::Refresh => "refresh",
            Self::Revocation => "revocation",
            Self::Db => "db",
            Self::BackgroundTask => "background_task",
            Self::Error => "error",
            Self::Internal => "internal",
        }
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    Config,
    Database,
    Crypto,
    Registry,
    State,
    TokenStore,
    TokenClient,
    Refresh,
    AccessToken,
    Authorization,
    Revocation,
    Integration,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Database => "database",
            Self::Crypto => "crypto",
            Self::Registry => "registry",
            Self::State => "state",
            Self::TokenStore => "token_store",
            Self::TokenClient => "token_client",
            Self::Refresh => "refresh",
            Self::AccessToken => "access_token",
            Self::Authorization => "authorization",
            Self::Revocation => "revocation",
            Self::Integration => "integration",
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_event {
    ($level:ident, $subject:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::$level!(
            subject = %$subject,
            stage = $crate::logging::LogStage::as_str($stage),
            component = $crate::logging::LogComponent::as_str($component),
            operation = $operation,
            $($key = ?$value,)*
            "{}",
            $description
        )
    };
}

/// `linfo!(subject, stage, component, operation, description, key = value, ...)`
#[macro_export]
macro_rules! linfo {
    ($($args:tt)*) => { $crate::__log_event!(info, $($args)*) };
}

#[macro_export]
macro_rules! lwarn {
    ($($args:tt)*) => { $crate::__log_event!(warn, $($args)*) };
}

#[macro_export]
macro_rules! lerror {
    ($($args:tt)*) => { $crate::__log_event!(error, $($args)*) };
}

#[macro_export]
macro_rules! ldebug {
    ($($args:tt)*) => { $crate::__log_event!(debug, $($args)*) };
}

/// 默认过滤规则：关闭 SQL 语句日志
fn default_filter(level: &str) -> String {
    format!("{level},career_connect=debug,sqlx::query=off,sea_orm::query=warn,sqlx=warn")
}

/// 初始化日志系统
///
/// `RUST_LOG` 存在时优先使用。重复初始化（例如测试中）会被忽略。
pub fn init_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter(level));

    let result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    if result.is_ok() {
        tracing::debug!(log_level = level, "logging initialized");
    }
}

/// 环境变量设置指南
pub fn print_logging_help() {
    println!("📋 日志配置指南:");
    println!("  RUST_LOG=info                          # 标准日志级别");
    println!("  RUST_LOG=debug                         # 调试级别");
    println!("  RUST_LOG=info,sqlx::query=info         # 开发环境：启用数据库查询日志");
    println!("  RUST_LOG=career_connect=trace          # 应用详细追踪");
    println!();
    println!("💡 组合示例:");
    println!("  RUST_LOG=info,career_connect::auth=debug   # 观察授权与刷新流程");
    println!("  RUST_LOG=warn                              # 仅警告和错误");
}
