//! # 集成记录实体定义
//!
//! 每个 (user_id, provider_id) 一行，保存加密后的 OAuth 令牌
//! 断开连接只做软删除（`is_active = false`），记录永不物理删除

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 集成记录实体
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: String,
    pub provider_id: String,
    /// 加密后的访问令牌（`iv:ciphertext`）
    #[serde(skip_serializing)]
    pub access_token: String,
    /// 加密后的刷新令牌，部分提供商不签发
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    /// 为空表示令牌永不过期
    pub expires_at: Option<DateTime>,
    /// 提供商实际授予的作用域
    pub scope: Option<String>,
    pub is_active: bool,
    /// 终态刷新失败后置为 false，表示需要重新授权
    pub is_connected: bool,
    pub connected_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 令牌在给定时间点是否已过期（无过期时间视为永久有效）
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// 检查令牌是否已过期
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().naive_utc())
    }

    /// 是否持有刷新令牌
    #[must_use]
    pub const fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// 是否处于可用状态（未断开且无需重新授权）
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.is_active && self.is_connected
    }
}
