//! 授权流程集成测试：授权 URL、回调交换、分组事务与 state 拒绝

mod common;

use career_connect::ConnectError;
use career_connect::auth::{AuthorizationPhase, CallbackOutcome, StateCodec, StatePayload};
use career_connect::error::StateError;
use chrono::{Duration, Utc};
use common::{USER, atlassian, harness, provider};
use pretty_assertions::assert_eq;
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url).unwrap().query_pairs().into_owned().collect()
}

async fn exchange_ok(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "granted-access",
            "refresh_token": "granted-refresh",
            "expires_in": 3600,
            "scope": "read"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn authorization_url_carries_required_params() {
    let server = MockServer::start().await;
    let h = harness(vec![provider(&server, "github")]).await;

    let request = h
        .context
        .integrations
        .begin_authorization(USER, "github")
        .unwrap();
    let params = query(&request.url);

    assert!(request.url.starts_with("https://auth.example.com/oauth/authorize?"));
    assert_eq!(params["client_id"], "github-client");
    assert_eq!(
        params["redirect_uri"],
        "http://localhost:8080/api/integrations/github/callback"
    );
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["scope"], "read");
    assert_eq!(params["state"], request.state);
    assert!(!params.contains_key("code_challenge"));
    assert_eq!(request.provider_ids, vec!["github".to_string()]);
}

#[tokio::test]
async fn pkce_challenge_sent_and_verifier_exchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code_verifier="))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_token": "pkce-access"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut pkce_provider = provider(&server, "linear");
    pkce_provider.supports_pkce = true;
    let h = harness(vec![pkce_provider]).await;

    let request = h
        .context
        .integrations
        .begin_authorization(USER, "linear")
        .unwrap();
    let params = query(&request.url);
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["code_challenge"].len(), 43);

    let outcome = h
        .context
        .integrations
        .handle_callback("auth-code", &request.state)
        .await;
    assert!(outcome.is_connected());
}

#[tokio::test]
async fn unknown_target_is_unavailable() {
    let server = MockServer::start().await;
    let h = harness(vec![provider(&server, "github")]).await;

    let err = h
        .context
        .integrations
        .begin_authorization(USER, "dropbox")
        .unwrap_err();
    assert!(matches!(err, ConnectError::ProviderUnavailable { .. }));
}

#[tokio::test]
async fn single_provider_callback_stores_tokens() {
    let server = MockServer::start().await;
    exchange_ok(&server, 1).await;
    let h = harness(vec![provider(&server, "github")]).await;

    let request = h
        .context
        .integrations
        .begin_authorization(USER, "github")
        .unwrap();
    // 部分提供商在 code 后附带 fragment
    let outcome = h
        .context
        .integrations
        .handle_callback("auth-code#_=_", &request.state)
        .await;

    match outcome {
        CallbackOutcome::Connected {
            user_id,
            provider_ids,
        } => {
            assert_eq!(user_id, USER);
            assert_eq!(provider_ids, vec!["github".to_string()]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let record = h.record("github").await.unwrap();
    assert!(record.is_active && record.is_connected);
    assert_eq!(h.store.reveal_access_token(&record).unwrap(), "granted-access");
    assert_ne!(record.access_token, "granted-access");
    assert_eq!(record.scope.as_deref(), Some("read"));
}

#[tokio::test]
async fn group_authorization_stores_every_member_in_one_exchange() {
    let server = MockServer::start().await;
    exchange_ok(&server, 1).await;
    let h = harness(atlassian(&server)).await;

    let request = h
        .context
        .integrations
        .begin_authorization(USER, "atlassian")
        .unwrap();
    let params = query(&request.url);
    assert_eq!(params["scope"], "read:jira offline_access read:confluence");
    assert_eq!(params["audience"], "api.atlassian.com");
    assert_eq!(request.provider_ids, vec!["jira".to_string(), "confluence".to_string()]);

    let outcome = h
        .context
        .integrations
        .handle_callback("auth-code", &request.state)
        .await;
    assert!(outcome.is_connected());

    for id in ["jira", "confluence"] {
        let record = h.record(id).await.unwrap();
        assert_eq!(h.store.reveal_access_token(&record).unwrap(), "granted-access");
        assert_eq!(
            h.store.reveal_refresh_token(&record).unwrap().as_deref(),
            Some("granted-refresh")
        );
    }
}

#[tokio::test]
async fn group_storage_failure_rolls_back_all_members() {
    let server = MockServer::start().await;
    exchange_ok(&server, 1).await;
    let h = harness(atlassian(&server)).await;
    h.db.execute_unprepared(
        "CREATE TRIGGER fail_confluence BEFORE INSERT ON integrations \
         WHEN NEW.provider_id = 'confluence' BEGIN SELECT RAISE(ABORT, 'boom'); END;",
    )
    .await
    .unwrap();

    let request = h
        .context
        .integrations
        .begin_authorization(USER, "atlassian")
        .unwrap();
    let outcome = h
        .context
        .integrations
        .handle_callback("auth-code", &request.state)
        .await;

    assert!(matches!(outcome, CallbackOutcome::Failed { .. }));
    assert_eq!(outcome.phase(), AuthorizationPhase::Rejected);
    assert!(h.record("jira").await.is_none());
    assert!(h.record("confluence").await.is_none());
}

#[tokio::test]
async fn rejected_exchange_is_failed_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "bad_verification_code"})))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness(vec![provider(&server, "github")]).await;

    let request = h
        .context
        .integrations
        .begin_authorization(USER, "github")
        .unwrap();
    let outcome = h
        .context
        .integrations
        .handle_callback("auth-code", &request.state)
        .await;

    assert!(matches!(outcome, CallbackOutcome::Failed { ref user_id, .. } if user_id == USER));
    assert!(h.record("github").await.is_none());
}

#[tokio::test]
async fn tampered_or_expired_state_is_rejected_without_exchange() {
    let server = MockServer::start().await;
    exchange_ok(&server, 0).await;
    let h = harness(vec![provider(&server, "github")]).await;

    let request = h
        .context
        .integrations
        .begin_authorization(USER, "github")
        .unwrap();
    let mut tampered = request.state.into_bytes();
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let outcome = h.context.integrations.handle_callback("auth-code", &tampered).await;
    assert!(matches!(
        outcome,
        CallbackOutcome::Rejected(StateError::Tampered | StateError::Malformed)
    ));

    let codec = StateCodec::new(Arc::clone(&h.crypto));
    let stale = codec
        .encode_at(
            StatePayload::new(USER, vec!["github".to_string()], None),
            Utc::now() - Duration::minutes(11),
        )
        .unwrap();
    let outcome = h.context.integrations.handle_callback("auth-code", &stale).await;
    assert!(matches!(
        outcome,
        CallbackOutcome::Rejected(StateError::Expired { .. })
    ));
}

#[tokio::test]
async fn provider_denial_is_rejected() {
    let server = MockServer::start().await;
    let h = harness(vec![provider(&server, "github")]).await;

    let request = h
        .context
        .integrations
        .begin_authorization(USER, "github")
        .unwrap();
    let outcome = h
        .context
        .integrations
        .handle_denied(&request.state, "access_denied");

    assert!(matches!(
        outcome,
        CallbackOutcome::Rejected(StateError::Denied(ref e)) if e == "access_denied"
    ));
}
