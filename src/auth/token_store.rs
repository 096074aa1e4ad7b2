//! # 令牌存储
//!
//! `integrations` 表的唯一写入方。令牌写入前加密，读取时按需解密。
//! 不发起任何网络请求，也不包含刷新策略。

use chrono::{DateTime, Utc};
use entity::{Integrations, integrations};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::fmt;
use std::sync::Arc;

use crate::config::TokenCrypto;
use crate::error::{Context, Result};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};

/// 一次授权或刷新得到的令牌
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    /// 为 None 时保留已存储的刷新令牌
    pub refresh_token: Option<String>,
    /// 为 None 表示永不过期
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// 集成记录存储
#[derive(Debug, Clone)]
pub struct TokenStore {
    db: DatabaseConnection,
    crypto: Arc<TokenCrypto>,
}

struct EncryptedTokens {
    access_token: String,
    refresh_token: Option<String>,
}

impl TokenStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection, crypto: Arc<TokenCrypto>) -> Self {
        Self { db, crypto }
    }

    /// 写入或更新单个提供商的令牌
    pub async fn store_tokens(
        &self,
        user_id: &str,
        provider_id: &str,
        tokens: &TokenSet,
    ) -> Result<()> {
        let encrypted = self.encrypt(tokens)?;
        Self::upsert(&self.db, user_id, provider_id, tokens, &encrypted)
            .await
            .with_context(|| format!("保存令牌失败: provider={provider_id}"))?;

        ldebug!(
            user_id,
            LogStage::Db,
            LogComponent::TokenStore,
            "tokens_stored",
            "令牌已保存",
            provider_id = provider_id,
            has_refresh_token = tokens.refresh_token.is_some(),
            expires_at = tokens.expires_at
        );
        Ok(())
    }

    /// 在一个事务中为组内所有提供商写入同一份授权
    pub async fn store_tokens_for_group(
        &self,
        user_id: &str,
        provider_ids: &[String],
        tokens: &TokenSet,
    ) -> Result<()> {
        let encrypted = self.encrypt(tokens)?;
        let txn = self.db.begin().await?;
        for provider_id in provider_ids {
            Self::upsert(&txn, user_id, provider_id, tokens, &encrypted)
                .await
                .with_context(|| format!("保存令牌失败: provider={provider_id}"))?;
        }
        txn.commit().await?;

        ldebug!(
            user_id,
            LogStage::Db,
            LogComponent::TokenStore,
            "group_tokens_stored",
            "组令牌已保存",
            provider_ids = provider_ids
        );
        Ok(())
    }

    pub async fn read_integration(
        &self,
        user_id: &str,
        provider_id: &str,
    ) -> Result<Option<integrations::Model>> {
        let model = Integrations::find()
            .filter(integrations::Column::UserId.eq(user_id))
            .filter(integrations::Column::ProviderId.eq(provider_id))
            .one(&self.db)
            .await?;
        Ok(model)
    }

    /// 用户的全部集成记录（含已断开的）
    pub async fn list_integrations(&self, user_id: &str) -> Result<Vec<integrations::Model>> {
        let models = Integrations::find()
            .filter(integrations::Column::UserId.eq(user_id))
            .order_by_asc(integrations::Column::ProviderId)
            .all(&self.db)
            .await?;
        Ok(models)
    }

    /// 在 `before` 之前过期、且可刷新的记录
    pub async fn find_expiring(&self, before: DateTime<Utc>) -> Result<Vec<integrations::Model>> {
        let models = Integrations::find()
            .filter(integrations::Column::IsActive.eq(true))
            .filter(integrations::Column::IsConnected.eq(true))
            .filter(integrations::Column::RefreshToken.is_not_null())
            .filter(integrations::Column::ExpiresAt.is_not_null())
            .filter(integrations::Column::ExpiresAt.lt(before.naive_utc()))
            .order_by_asc(integrations::Column::ExpiresAt)
            .all(&self.db)
            .await?;
        Ok(models)
    }

    /// 保存刷新结果，只更新仍处于活跃且已连接状态的记录。
    ///
    /// 返回 false 表示刷新期间记录已被断开或标记为需要重新授权，结果被丢弃。
    pub async fn update_refreshed(
        &self,
        user_id: &str,
        provider_id: &str,
        tokens: &TokenSet,
    ) -> Result<bool> {
        let encrypted = self.encrypt(tokens)?;
        let mut update = Integrations::update_many()
            .col_expr(
                integrations::Column::AccessToken,
                Expr::value(encrypted.access_token),
            )
            .col_expr(
                integrations::Column::ExpiresAt,
                Expr::value(tokens.expires_at.map(|t| t.naive_utc())),
            )
            .col_expr(
                integrations::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            );
        if let Some(refresh_token) = encrypted.refresh_token {
            update = update.col_expr(integrations::Column::RefreshToken, Expr::value(refresh_token));
        }
        if let Some(scope) = tokens.scope.clone() {
            update = update.col_expr(integrations::Column::Scope, Expr::value(scope));
        }

        let result = update
            .filter(integrations::Column::UserId.eq(user_id))
            .filter(integrations::Column::ProviderId.eq(provider_id))
            .filter(integrations::Column::IsActive.eq(true))
            .filter(integrations::Column::IsConnected.eq(true))
            .exec(&self.db)
            .await
            .with_context(|| format!("保存刷新结果失败: provider={provider_id}"))?;

        ldebug!(
            user_id,
            LogStage::Db,
            LogComponent::TokenStore,
            "refreshed_tokens_stored",
            "刷新结果已保存",
            provider_id = provider_id,
            rows_affected = result.rows_affected
        );
        Ok(result.rows_affected > 0)
    }

    /// 软删除；返回是否有活跃记录被停用
    pub async fn deactivate(&self, user_id: &str, provider_id: &str) -> Result<bool> {
        let result = Integrations::update_many()
            .col_expr(integrations::Column::IsActive, Expr::value(false))
            .col_expr(
                integrations::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(integrations::Column::UserId.eq(user_id))
            .filter(integrations::Column::ProviderId.eq(provider_id))
            .filter(integrations::Column::IsActive.eq(true))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// 刷新终态失败后标记为需要重新授权
    pub async fn mark_needs_reconnect(&self, user_id: &str, provider_id: &str) -> Result<()> {
        Integrations::update_many()
            .col_expr(integrations::Column::IsConnected, Expr::value(false))
            .col_expr(
                integrations::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(integrations::Column::UserId.eq(user_id))
            .filter(integrations::Column::ProviderId.eq(provider_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub fn reveal_access_token(&self, model: &integrations::Model) -> Result<String> {
        self.crypto.decrypt(&model.access_token)
    }

    pub fn reveal_refresh_token(&self, model: &integrations::Model) -> Result<Option<String>> {
        model
            .refresh_token
            .as_deref()
            .map(|token| self.crypto.decrypt(token))
            .transpose()
    }

    fn encrypt(&self, tokens: &TokenSet) -> Result<EncryptedTokens> {
        Ok(EncryptedTokens {
            access_token: self.crypto.encrypt(&tokens.access_token)?,
            refresh_token: tokens
                .refresh_token
                .as_deref()
                .map(|token| self.crypto.encrypt(token))
                .transpose()?,
        })
    }

    /// `connected_at` 只在首次插入时写入；缺省的刷新令牌与 scope 不覆盖旧值
    async fn upsert<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        provider_id: &str,
        tokens: &TokenSet,
        encrypted: &EncryptedTokens,
    ) -> Result<()> {
        let now = Utc::now().naive_utc();
        let model = integrations::ActiveModel {
            user_id: Set(user_id.to_string()),
            provider_id: Set(provider_id.to_string()),
            access_token: Set(encrypted.access_token.clone()),
            refresh_token: Set(encrypted.refresh_token.clone()),
            expires_at: Set(tokens.expires_at.map(|t| t.naive_utc())),
            scope: Set(tokens.scope.clone()),
            is_active: Set(true),
            is_connected: Set(true),
            connected_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let mut update_columns = vec![
            integrations::Column::AccessToken,
            integrations::Column::ExpiresAt,
            integrations::Column::IsActive,
            integrations::Column::IsConnected,
            integrations::Column::UpdatedAt,
        ];
        if encrypted.refresh_token.is_some() {
            update_columns.push(integrations::Column::RefreshToken);
        }
        if tokens.scope.is_some() {
            update_columns.push(integrations::Column::Scope);
        }

        Integrations::insert(model)
            .on_conflict(
                OnConflict::columns([
                    integrations::Column::UserId,
                    integrations::Column::ProviderId,
                ])
                .update_columns(update_columns)
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn store() -> TokenStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        TokenStore::new(db, Arc::new(TokenCrypto::from_secret("store-secret").unwrap()))
    }

    fn tokens(access: &str, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            refresh_token: refresh.map(ToString::to_string),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scope: Some("read".to_string()),
        }
    }

    #[tokio::test]
    async fn test_tokens_encrypted_at_rest() {
        let store = store().await;
        store
            .store_tokens("u1", "github", &tokens("access-1", Some("refresh-1")))
            .await
            .unwrap();

        let model = store.read_integration("u1", "github").await.unwrap().unwrap();
        assert_ne!(model.access_token, "access-1");
        assert!(model.is_usable());
        assert_eq!(store.reveal_access_token(&model).unwrap(), "access-1");
        assert_eq!(
            store.reveal_refresh_token(&model).unwrap().as_deref(),
            Some("refresh-1")
        );
    }

    #[tokio::test]
    async fn test_deactivate_only_once() {
        let store = store().await;
        store
            .store_tokens("u1", "slack", &tokens("a", None))
            .await
            .unwrap();

        assert!(store.deactivate("u1", "slack").await.unwrap());
        assert!(!store.deactivate("u1", "slack").await.unwrap());
        assert!(!store.deactivate("u1", "missing").await.unwrap());

        let model = store.read_integration("u1", "slack").await.unwrap().unwrap();
        assert!(!model.is_active);
    }

    #[tokio::test]
    async fn test_find_expiring_filters_rows() {
        let store = store().await;
        let soon = TokenSet {
            expires_at: Some(Utc::now() + Duration::minutes(2)),
            ..tokens("a", Some("r"))
        };
        store.store_tokens("u1", "jira", &soon).await.unwrap();
        store
            .store_tokens("u1", "linear", &tokens("a", Some("r")))
            .await
            .unwrap();
        // 无刷新令牌的记录不会被扫描
        store
            .store_tokens("u1", "notion", &TokenSet { refresh_token: None, ..soon.clone() })
            .await
            .unwrap();

        let expiring = store
            .find_expiring(Utc::now() + Duration::minutes(10))
            .await
            .unwrap();
        let ids: Vec<_> = expiring.iter().map(|m| m.provider_id.as_str()).collect();
        assert_eq!(ids, vec!["jira"]);

        store.mark_needs_reconnect("u1", "jira").await.unwrap();
        assert!(
            store
                .find_expiring(Utc::now() + Duration::minutes(10))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_update_refreshed_skips_unusable_rows() {
        let store = store().await;
        store
            .store_tokens("u1", "github", &tokens("a", Some("r1")))
            .await
            .unwrap();
        assert!(
            store
                .update_refreshed("u1", "github", &tokens("b", None))
                .await
                .unwrap()
        );
        let model = store.read_integration("u1", "github").await.unwrap().unwrap();
        assert_eq!(store.reveal_access_token(&model).unwrap(), "b");
        assert_eq!(store.reveal_refresh_token(&model).unwrap().as_deref(), Some("r1"));

        store.deactivate("u1", "github").await.unwrap();
        assert!(
            !store
                .update_refreshed("u1", "github", &tokens("c", Some("r2")))
                .await
                .unwrap()
        );
        let model = store.read_integration("u1", "github").await.unwrap().unwrap();
        assert!(!model.is_active);
        assert_eq!(store.reveal_access_token(&model).unwrap(), "b");

        store
            .store_tokens("u1", "gitlab", &tokens("a", Some("r1")))
            .await
            .unwrap();
        store.mark_needs_reconnect("u1", "gitlab").await.unwrap();
        assert!(
            !store
                .update_refreshed("u1", "gitlab", &tokens("c", None))
                .await
                .unwrap()
        );
        assert!(!store.read_integration("u1", "gitlab").await.unwrap().unwrap().is_connected);
        assert!(!store.update_refreshed("u1", "missing", &tokens("c", None)).await.unwrap());
    }
}
