//! 应用上下文（DI 容器）
//!
//! 统一持有跨模块共享的服务实例。协调器只在这里创建一次，
//! 访问令牌服务与后台刷新任务共用同一个在途表。

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::{
    AccessTokenService, AuthorizationFlow, IntegrationService, RefreshCoordinator, RefreshPolicy,
    RefreshTask, RevocationService, StateCodec, TokenEndpointClient, TokenStore,
};
use crate::config::{AppConfig, TokenCrypto};
use crate::error::{ConnectError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::provider::ProviderRegistry;
use crate::{database, linfo};

#[derive(Clone, Debug)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub registry: Arc<ProviderRegistry>,
    pub coordinator: RefreshCoordinator,
    pub integrations: IntegrationService,
}

impl AppContext {
    /// 从环境构建：读取加密密钥、连接数据库并执行迁移、加载提供商
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        let crypto = TokenCrypto::from_env()?;

        let db = database::init_database(&config.database.url, config.database.max_connections)
            .await
            .map_err(|e| ConnectError::database_with_source("数据库连接失败", e))?;
        database::run_migrations(&db)
            .await
            .map_err(|e| ConnectError::database_with_source("数据库迁移失败", e))?;

        let registry = ProviderRegistry::from_env(&config.oauth.public_base_url);
        Self::build(config, crypto, db, registry)
    }

    /// 用已准备好的依赖组装服务
    pub fn build(
        config: AppConfig,
        crypto: TokenCrypto,
        db: DatabaseConnection,
        registry: ProviderRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let crypto = Arc::new(crypto);
        let registry = Arc::new(registry);
        let client = TokenEndpointClient::new(config.oauth.http_timeout())?;
        let store = TokenStore::new(db.clone(), Arc::clone(&crypto));

        let coordinator = RefreshCoordinator::new(
            store.clone(),
            Arc::clone(&registry),
            client.clone(),
            RefreshPolicy::from(&config.refresh),
        );
        let access_tokens = AccessTokenService::new(store.clone(), coordinator.clone());
        let authorization = AuthorizationFlow::new(
            Arc::clone(&registry),
            StateCodec::new(crypto),
            client.clone(),
            store.clone(),
        );
        let revocation = RevocationService::new(Arc::clone(&registry), client);
        let integrations = IntegrationService::new(
            Arc::clone(&registry),
            store,
            access_tokens,
            authorization,
            revocation,
        );

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "context_ready",
            "应用上下文初始化完成",
            providers = registry.list_available()
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            registry,
            coordinator,
            integrations,
        })
    }

    /// 启动主动刷新任务；配置关闭时返回 None
    #[must_use]
    pub fn start_refresh_task(&self, cancel: CancellationToken) -> Option<RefreshTask> {
        let refresh = &self.config.refresh;
        if !refresh.sweep_enabled() {
            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Refresh,
                "refresh_task_disabled",
                "主动刷新任务已禁用"
            );
            return None;
        }
        Some(RefreshTask::spawn(
            self.coordinator.clone(),
            Duration::from_secs(refresh.sweep_interval_seconds),
            chrono::Duration::minutes(refresh.sweep_window_minutes),
            cancel,
        ))
    }
}
