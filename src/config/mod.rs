//! # 配置管理模块
//!
//! 处理应用配置加载、验证和令牌加密

mod app_config;
mod crypto;
mod database;

pub use app_config::{AppConfig, OAuthConfig, RefreshConfig};
pub use crypto::{ENCRYPTION_SECRET_ENV, TokenCrypto};
pub use database::DatabaseConfig;

use crate::error::{ConnectError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};
use std::env;
use std::path::Path;

/// 加载配置
///
/// 读取 `config/config.{RUST_ENV}.toml`，文件不存在时使用默认值；
/// 之后应用 `DATABASE_URL` 与 `PUBLIC_BASE_URL` 环境变量覆盖并校验。
pub fn load_config() -> Result<AppConfig> {
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let config_file = env::var("CAREER_CONNECT_CONFIG_PATH")
        .unwrap_or_else(|_| format!("config/config.{env}.toml"));

    let mut config = if Path::new(&config_file).exists() {
        let content = std::fs::read_to_string(&config_file).map_err(|e| {
            ConnectError::config_with_source(format!("读取配置文件失败: {config_file}"), e)
        })?;
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_loaded",
            "已加载配置文件",
            path = config_file
        );
        toml::from_str::<AppConfig>(&content)?
    } else {
        ldebug!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_default",
            "配置文件不存在，使用默认配置",
            path = config_file
        );
        AppConfig::default()
    };

    apply_env_overrides(&mut config, |key| env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// 环境变量覆盖
fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
        config.database.url = url;
    }
    if let Some(base) = lookup("PUBLIC_BASE_URL").filter(|v| !v.is_empty()) {
        config.oauth.public_base_url = base.trim_end_matches('/').to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "sqlite::memory:"),
            ("PUBLIC_BASE_URL", "https://career.example.com/"),
        ]);
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.database.url, "sqlite::memory:");
        assert!(config.database.is_memory_database());
        assert_eq!(config.oauth.public_base_url, "https://career.example.com");
    }

    #[test]
    fn test_empty_override_ignored() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |_| Some(String::new()));
        assert_eq!(config.database.url, DatabaseConfig::default().url);
    }
}
