//! 断开、校验与列表集成测试

mod common;

use career_connect::IntegrationStatus;
use chrono::Duration;
use common::{USER, harness, provider};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn failed_revocation_does_not_block_disconnect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token=rt-1"))
        .and(body_string_contains("token_type_hint=refresh_token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(vec![provider(&server, "github")]).await;
    h.seed("github", Some(Duration::hours(1)), Some("rt-1")).await;

    assert!(h.context.integrations.disconnect(USER, "github").await.unwrap());

    let record = h.record("github").await.unwrap();
    assert!(!record.is_active);
    assert_eq!(h.context.integrations.get_access_token(USER, "github").await, None);
}

#[tokio::test]
async fn access_token_revoked_when_no_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token=stored-access"))
        .and(body_string_contains("token_type_hint=access_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(vec![provider(&server, "slack")]).await;
    h.seed("slack", None, None).await;

    assert!(h.context.integrations.disconnect(USER, "slack").await.unwrap());
}

#[tokio::test]
async fn provider_without_revocation_endpoint_still_disconnects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut linear = provider(&server, "linear");
    linear.revocation_url = None;
    let h = harness(vec![linear]).await;
    h.seed("linear", Some(Duration::hours(1)), Some("rt-1")).await;

    assert!(h.context.integrations.disconnect(USER, "linear").await.unwrap());
    // 再次断开没有活跃集成
    assert!(!h.context.integrations.disconnect(USER, "linear").await.unwrap());
    assert!(!h.context.integrations.disconnect(USER, "github").await.unwrap());
}

#[tokio::test]
async fn validate_reports_each_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(vec![provider(&server, "github"), provider(&server, "gitlab")]).await;
    let service = &h.context.integrations;

    assert_eq!(
        service.validate_integration(USER, "figma").await,
        IntegrationStatus::Unavailable
    );
    assert_eq!(
        service.validate_integration(USER, "github").await,
        IntegrationStatus::NotConnected
    );

    h.seed("github", Some(Duration::hours(1)), Some("rt-1")).await;
    assert_eq!(
        service.validate_integration(USER, "github").await,
        IntegrationStatus::Connected
    );

    h.seed("gitlab", Some(Duration::minutes(-5)), Some("rt-2")).await;
    assert_eq!(
        service.validate_integration(USER, "gitlab").await,
        IntegrationStatus::NeedsReconnect
    );
    // 终止性失败后不再发起刷新
    assert_eq!(
        service.validate_integration(USER, "gitlab").await,
        IntegrationStatus::NeedsReconnect
    );
}

#[tokio::test]
async fn list_integrations_derives_status_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(vec![
        provider(&server, "github"),
        provider(&server, "notion"),
        provider(&server, "asana"),
    ])
    .await;
    h.seed("github", Some(Duration::hours(1)), Some("rt-1")).await;
    h.seed("notion", Some(Duration::minutes(-1)), None).await;
    h.seed("asana", None, None).await;
    h.store.deactivate(USER, "asana").await.unwrap();

    let mut summaries = h.context.integrations.list_integrations(USER).await.unwrap();
    summaries.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
    let statuses: Vec<(&str, IntegrationStatus)> = summaries
        .iter()
        .map(|s| (s.provider_id.as_str(), s.status))
        .collect();

    assert_eq!(
        statuses,
        vec![
            ("asana", IntegrationStatus::NotConnected),
            ("github", IntegrationStatus::Connected),
            ("notion", IntegrationStatus::NeedsReconnect),
        ]
    );
    assert_eq!(
        h.context.integrations.available_providers(),
        vec!["asana".to_string(), "github".to_string(), "notion".to_string()]
    );
}

#[tokio::test]
async fn refresh_finishing_after_disconnect_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh", "refresh_token": "rt-2"}))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let h = harness(vec![provider(&server, "github")]).await;
    h.seed("github", Some(Duration::minutes(1)), Some("rt-1")).await;

    let coordinator = h.context.coordinator.clone();
    let pending = tokio::spawn(async move { coordinator.refresh(USER, "github").await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(h.context.integrations.disconnect(USER, "github").await.unwrap());
    assert_eq!(pending.await.unwrap(), None);

    let record = h.record("github").await.unwrap();
    assert!(!record.is_active);
    assert_eq!(h.store.reveal_access_token(&record).unwrap(), "stored-access");
    assert_eq!(
        h.store.reveal_refresh_token(&record).unwrap().as_deref(),
        Some("rt-1")
    );
    assert_eq!(h.context.integrations.get_access_token(USER, "github").await, None);
}
