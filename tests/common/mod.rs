//! 集成测试公共工具：内存数据库、指向 wiremock 的提供商配置、服务组装
#![allow(dead_code)]

use career_connect::AppContext;
use career_connect::auth::{TokenSet, TokenStore};
use career_connect::config::{AppConfig, TokenCrypto};
use career_connect::provider::{
    AuthorizationExtras, ClientAuthMethod, ProviderConfig, ProviderRegistry, ScopeDelimiter,
};
use chrono::{Duration, Utc};
use entity::integrations;
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use wiremock::MockServer;

pub const USER: &str = "user-1";
pub const SECRET: &str = "integration-test-secret";

pub struct Harness {
    pub db: DatabaseConnection,
    pub store: TokenStore,
    pub context: AppContext,
    pub crypto: Arc<TokenCrypto>,
}

pub async fn memory_db() -> DatabaseConnection {
    // 单连接：回滚后的读取与事务使用同一个连接
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

pub fn provider(server: &MockServer, id: &str) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        client_id: format!("{id}-client"),
        client_secret: format!("{id}-secret"),
        redirect_uri: format!("http://localhost:8080/api/integrations/{id}/callback"),
        authorization_url: "https://auth.example.com/oauth/authorize".to_string(),
        token_url: format!("{}/token", server.uri()),
        revocation_url: Some(format!("{}/revoke", server.uri())),
        scopes: vec!["read".to_string()],
        scope_delimiter: ScopeDelimiter::Space,
        group_id: None,
        supports_pkce: false,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::None,
    }
}

/// jira + confluence 共用一个 OAuth 应用
pub fn atlassian(server: &MockServer) -> Vec<ProviderConfig> {
    ["jira", "confluence"]
        .into_iter()
        .map(|id| ProviderConfig {
            group_id: Some("atlassian".to_string()),
            redirect_uri: "http://localhost:8080/api/integrations/atlassian/callback".to_string(),
            scopes: vec![format!("read:{id}"), "offline_access".to_string()],
            extras: AuthorizationExtras::AtlassianConsent,
            ..provider(server, id)
        })
        .collect()
}

/// 重试延迟缩短到毫秒级，关闭后台扫描
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.refresh.base_delay_ms = 10;
    config.refresh.sweep_interval_seconds = 0;
    config
}

pub async fn harness(providers: Vec<ProviderConfig>) -> Harness {
    let db = memory_db().await;
    let crypto = Arc::new(TokenCrypto::from_secret(SECRET).unwrap());
    let store = TokenStore::new(db.clone(), Arc::clone(&crypto));
    let context = AppContext::build(
        test_config(),
        TokenCrypto::from_secret(SECRET).unwrap(),
        db.clone(),
        ProviderRegistry::from_configs(providers),
    )
    .unwrap();
    Harness {
        db,
        store,
        context,
        crypto,
    }
}

impl Harness {
    /// 写入一条 `expires_in` 后过期的集成
    pub async fn seed(&self, provider_id: &str, expires_in: Option<Duration>, refresh: Option<&str>) {
        self.store
            .store_tokens(
                USER,
                provider_id,
                &TokenSet {
                    access_token: "stored-access".to_string(),
                    refresh_token: refresh.map(ToString::to_string),
                    expires_at: expires_in.map(|d| Utc::now() + d),
                    scope: Some("read".to_string()),
                },
            )
            .await
            .unwrap();
    }

    pub async fn record(&self, provider_id: &str) -> Option<integrations::Model> {
        self.store.read_integration(USER, provider_id).await.unwrap()
    }
}
