//! Provider capability module。
//!
//! - `catalog`：内置提供商的端点与默认 scope
//! - `registry`：按环境变量启用的提供商集合
//! - `types`：提供商配置及授权附加参数

mod catalog;
mod registry;
mod types;

pub use catalog::{CATALOG, ProviderSpec};
pub use registry::ProviderRegistry;
pub use types::{AuthorizationExtras, ClientAuthMethod, ProviderConfig, ScopeDelimiter};
