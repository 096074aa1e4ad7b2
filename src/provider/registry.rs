//! 提供商注册表：启动时根据环境变量构建，之后只读。

use std::collections::HashMap;

use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

use super::catalog::{CATALOG, ProviderSpec};
use super::types::ProviderConfig;

/// 已配置凭据的提供商集合
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// 从进程环境变量构建
    #[must_use]
    pub fn from_env(public_base_url: &str) -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars, public_base_url)
    }

    /// 从给定变量表构建；缺少凭据的提供商被跳过
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>, public_base_url: &str) -> Self {
        let base = public_base_url.trim_end_matches('/');
        let lookup = |key: String| vars.get(&key).filter(|v| !v.trim().is_empty()).cloned();

        let configs = CATALOG
            .iter()
            .filter_map(|spec| {
                let prefix = spec.env_prefix();
                let (Some(client_id), Some(client_secret)) = (
                    lookup(format!("{prefix}_CLIENT_ID")),
                    lookup(format!("{prefix}_CLIENT_SECRET")),
                ) else {
                    ldebug!(
                        "system",
                        LogStage::Startup,
                        LogComponent::Registry,
                        "provider_skipped",
                        "提供商缺少凭据，已跳过",
                        provider_id = spec.id
                    );
                    return None;
                };
                let redirect_uri = lookup(format!("{prefix}_REDIRECT_URI"))
                    .unwrap_or_else(|| default_redirect_uri(base, spec));
                Some(spec.into_config(client_id, client_secret, redirect_uri))
            })
            .collect();

        let registry = Self::from_configs(configs);
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Registry,
            "registry_built",
            "提供商注册表已构建",
            available = registry.list_available()
        );
        registry
    }

    /// 直接由配置构建，保持传入顺序
    #[must_use]
    pub fn from_configs(configs: Vec<ProviderConfig>) -> Self {
        let mut providers = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());
        for config in configs {
            if index.contains_key(&config.id) {
                continue;
            }
            index.insert(config.id.clone(), providers.len());
            providers.push(config);
        }
        Self { providers, index }
    }

    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<&ProviderConfig> {
        self.index.get(provider_id).map(|&i| &self.providers[i])
    }

    #[must_use]
    pub fn is_available(&self, provider_id: &str) -> bool {
        self.index.contains_key(provider_id)
    }

    /// 已配置的提供商 id，按字母排序
    #[must_use]
    pub fn list_available(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.iter().map(|p| p.id.clone()).collect();
        ids.sort();
        ids
    }

    /// 组内已配置的成员
    #[must_use]
    pub fn group_members(&self, group_id: &str) -> Vec<&ProviderConfig> {
        self.providers
            .iter()
            .filter(|p| p.group_id.as_deref() == Some(group_id))
            .collect()
    }

    /// 解析授权目标：提供商 id 或组 id
    #[must_use]
    pub fn resolve_target(&self, provider_or_group: &str) -> Vec<&ProviderConfig> {
        match self.get(provider_or_group) {
            Some(config) => vec![config],
            None => self.group_members(provider_or_group),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn default_redirect_uri(base: &str, spec: &ProviderSpec) -> String {
    format!("{base}/api/integrations/{}/callback", spec.callback_key())
}
