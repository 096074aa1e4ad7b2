//! 内置提供商目录：端点、默认 scope 与授权附加参数。

use super::types::{AuthorizationExtras, ClientAuthMethod, ProviderConfig, ScopeDelimiter};

/// 目录中的静态条目，凭据在运行时补齐
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub id: &'static str,
    pub group_id: Option<&'static str>,
    pub authorization_url: &'static str,
    pub token_url: &'static str,
    pub revocation_url: Option<&'static str>,
    pub scopes: &'static [&'static str],
    pub scope_delimiter: ScopeDelimiter,
    pub supports_pkce: bool,
    pub client_auth: ClientAuthMethod,
    pub extras: AuthorizationExtras,
}

impl ProviderSpec {
    /// 环境变量前缀：分组提供商共用组前缀
    #[must_use]
    pub fn env_prefix(&self) -> String {
        self.group_id.unwrap_or(self.id).to_uppercase()
    }

    #[must_use]
    pub fn callback_key(&self) -> &'static str {
        self.group_id.unwrap_or(self.id)
    }

    /// 补齐凭据生成完整配置
    #[must_use]
    pub fn into_config(
        self,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> ProviderConfig {
        ProviderConfig {
            id: self.id.to_string(),
            client_id,
            client_secret,
            redirect_uri,
            authorization_url: self.authorization_url.to_string(),
            token_url: self.token_url.to_string(),
            revocation_url: self.revocation_url.map(ToString::to_string),
            scopes: self.scopes.iter().map(ToString::to_string).collect(),
            scope_delimiter: self.scope_delimiter,
            group_id: self.group_id.map(ToString::to_string),
            supports_pkce: self.supports_pkce,
            client_auth: self.client_auth,
            extras: self.extras,
        }
    }
}

const GOOGLE_AUTHORIZE: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE: &str = "https://oauth2.googleapis.com/revoke";
const ATLASSIAN_AUTHORIZE: &str = "https://auth.atlassian.com/authorize";
const ATLASSIAN_TOKEN: &str = "https://auth.atlassian.com/oauth/token";

/// 目录顺序即分组成员的 scope 合并顺序
pub static CATALOG: &[ProviderSpec] = &[
    ProviderSpec {
        id: "github",
        group_id: None,
        authorization_url: "https://github.com/login/oauth/authorize",
        token_url: "https://github.com/login/oauth/access_token",
        revocation_url: None,
        scopes: &["read:user", "repo"],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: false,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::None,
    },
    ProviderSpec {
        id: "gitlab",
        group_id: None,
        authorization_url: "https://gitlab.com/oauth/authorize",
        token_url: "https://gitlab.com/oauth/token",
        revocation_url: Some("https://gitlab.com/oauth/revoke"),
        scopes: &["read_user", "read_api"],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: true,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::None,
    },
    ProviderSpec {
        id: "jira",
        group_id: Some("atlassian"),
        authorization_url: ATLASSIAN_AUTHORIZE,
        token_url: ATLASSIAN_TOKEN,
        revocation_url: None,
        scopes: &["read:jira-work", "read:jira-user", "offline_access"],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: false,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::AtlassianConsent,
    },
    ProviderSpec {
        id: "confluence",
        group_id: Some("atlassian"),
        authorization_url: ATLASSIAN_AUTHORIZE,
        token_url: ATLASSIAN_TOKEN,
        revocation_url: None,
        scopes: &[
            "read:confluence-content.all",
            "read:confluence-space.summary",
            "offline_access",
        ],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: false,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::AtlassianConsent,
    },
    ProviderSpec {
        id: "google_calendar",
        group_id: Some("google"),
        authorization_url: GOOGLE_AUTHORIZE,
        token_url: GOOGLE_TOKEN,
        revocation_url: Some(GOOGLE_REVOKE),
        scopes: &["https://www.googleapis.com/auth/calendar.readonly"],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: true,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::GoogleOffline,
    },
    ProviderSpec {
        id: "google_drive",
        group_id: Some("google"),
        authorization_url: GOOGLE_AUTHORIZE,
        token_url: GOOGLE_TOKEN,
        revocation_url: Some(GOOGLE_REVOKE),
        scopes: &["https://www.googleapis.com/auth/drive.metadata.readonly"],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: true,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::GoogleOffline,
    },
    ProviderSpec {
        id: "linear",
        group_id: None,
        authorization_url: "https://linear.app/oauth/authorize",
        token_url: "https://api.linear.app/oauth/token",
        revocation_url: Some("https://api.linear.app/oauth/revoke"),
        scopes: &["read"],
        scope_delimiter: ScopeDelimiter::Comma,
        supports_pkce: false,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::None,
    },
    ProviderSpec {
        id: "slack",
        group_id: None,
        authorization_url: "https://slack.com/oauth/v2/authorize",
        token_url: "https://slack.com/api/oauth.v2.access",
        revocation_url: Some("https://slack.com/api/auth.revoke"),
        scopes: &["channels:history", "channels:read", "users:read"],
        scope_delimiter: ScopeDelimiter::Comma,
        supports_pkce: false,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::None,
    },
    ProviderSpec {
        id: "notion",
        group_id: None,
        authorization_url: "https://api.notion.com/v1/oauth/authorize",
        token_url: "https://api.notion.com/v1/oauth/token",
        revocation_url: None,
        scopes: &[],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: false,
        client_auth: ClientAuthMethod::BasicAuth,
        extras: AuthorizationExtras::NotionOwner,
    },
    ProviderSpec {
        id: "asana",
        group_id: None,
        authorization_url: "https://app.asana.com/-/oauth_authorize",
        token_url: "https://app.asana.com/-/oauth_token",
        revocation_url: Some("https://app.asana.com/-/oauth_revoke"),
        scopes: &["default"],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: false,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::None,
    },
    ProviderSpec {
        id: "figma",
        group_id: None,
        authorization_url: "https://www.figma.com/oauth",
        token_url: "https://api.figma.com/v1/oauth/token",
        revocation_url: None,
        scopes: &["files:read"],
        scope_delimiter: ScopeDelimiter::Comma,
        supports_pkce: false,
        client_auth: ClientAuthMethod::BasicAuth,
        extras: AuthorizationExtras::None,
    },
    ProviderSpec {
        id: "microsoft_outlook",
        group_id: None,
        authorization_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
        token_url: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        revocation_url: None,
        scopes: &["offline_access", "User.Read", "Mail.Read", "Calendars.Read"],
        scope_delimiter: ScopeDelimiter::Space,
        supports_pkce: true,
        client_auth: ClientAuthMethod::RequestBody,
        extras: AuthorizationExtras::MicrosoftOffline,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn find(id: &str) -> Option<&'static ProviderSpec> {
        CATALOG.iter().find(|spec| spec.id == id)
    }

    #[test]
    fn catalog_ids_are_unique() {
        let ids: HashSet<_> = CATALOG.iter().map(|spec| spec.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn grouped_members_share_endpoints() {
        let jira = find("jira").unwrap();
        let confluence = find("confluence").unwrap();
        assert_eq!(jira.token_url, confluence.token_url);
        assert_eq!(jira.env_prefix(), "ATLASSIAN");
        assert_eq!(confluence.callback_key(), "atlassian");

        let drive = find("google_drive").unwrap();
        assert_eq!(drive.env_prefix(), "GOOGLE");
        assert_eq!(find("github").unwrap().env_prefix(), "GITHUB");
    }
}
