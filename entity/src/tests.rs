//! # 实体定义测试
//!
//! 测试 Sea-ORM 实体辅助方法的正确性

#[cfg(test)]
mod tests {
    use crate::integrations;
    use chrono::{Duration, Utc};
    use sea_orm::Set;

    fn sample_model() -> integrations::Model {
        let now = Utc::now().naive_utc();
        integrations::Model {
            id: 1,
            user_id: "user-1".to_string(),
            provider_id: "github".to_string(),
            access_token: "iv:cipher".to_string(),
            refresh_token: None,
            expires_at: None,
            scope: Some("read:user".to_string()),
            is_active: true,
            is_connected: true,
            connected_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_integration_active_model_creation() {
        let integration = integrations::ActiveModel {
            user_id: Set("user-1".to_string()),
            provider_id: Set("jira".to_string()),
            is_active: Set(true),
            ..Default::default()
        };

        assert_eq!(integration.user_id.as_ref(), "user-1");
        assert_eq!(integration.provider_id.as_ref(), "jira");
        assert_eq!(integration.is_active.as_ref(), &true);
    }

    #[test]
    fn test_non_expiring_token_never_expires() {
        let model = sample_model();
        assert!(!model.is_expired());
        assert!(!model.has_refresh_token());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now().naive_utc();
        let mut model = sample_model();
        model.expires_at = Some(now);

        assert!(model.is_expired_at(now));
        assert!(!model.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_usable_requires_active_and_connected() {
        let mut model = sample_model();
        assert!(model.is_usable());

        model.is_connected = false;
        assert!(!model.is_usable());

        model.is_connected = true;
        model.is_active = false;
        assert!(!model.is_usable());
    }
}
