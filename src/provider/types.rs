use serde::Serialize;
use std::fmt;

/// scope 参数的拼接方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeDelimiter {
    Space,
    Comma,
}

impl ScopeDelimiter {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Space => " ",
            Self::Comma => ",",
        }
    }

    #[must_use]
    pub fn join(self, scopes: &[String]) -> String {
        scopes.join(self.as_str())
    }
}

/// 令牌端点的客户端认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClientAuthMethod {
    /// client_id / client_secret 放在表单中
    RequestBody,
    /// HTTP Basic 认证
    BasicAuth,
}

/// 提供商特定的授权 URL 附加参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthorizationExtras {
    None,
    /// Google：申请离线访问并强制同意页，以便拿到 refresh token
    GoogleOffline,
    /// Atlassian 3LO
    AtlassianConsent,
    NotionOwner,
    MicrosoftOffline,
}

impl AuthorizationExtras {
    #[must_use]
    pub const fn params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::None => &[],
            Self::GoogleOffline => &[
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
            ],
            Self::AtlassianConsent => &[("audience", "api.atlassian.com"), ("prompt", "consent")],
            Self::NotionOwner => &[("owner", "user")],
            Self::MicrosoftOffline => &[("response_mode", "query"), ("prompt", "select_account")],
        }
    }
}

/// 单个提供商的 OAuth 配置，启动时构建后不再修改
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub id: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorization_url: String,
    pub token_url: String,
    pub revocation_url: Option<String>,
    pub scopes: Vec<String>,
    pub scope_delimiter: ScopeDelimiter,
    /// 共享同一个 OAuth 应用的提供商组
    pub group_id: Option<String>,
    pub supports_pkce: bool,
    pub client_auth: ClientAuthMethod,
    pub extras: AuthorizationExtras,
}

impl ProviderConfig {
    /// 回调路径中使用的标识：分组提供商使用组 id
    #[must_use]
    pub fn callback_key(&self) -> &str {
        self.group_id.as_deref().unwrap_or(&self.id)
    }

    #[must_use]
    pub const fn supports_revocation(&self) -> bool {
        self.revocation_url.is_some()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("group_id", &self.group_id)
            .field("supports_pkce", &self.supports_pkce)
            .finish_non_exhaustive()
    }
}
