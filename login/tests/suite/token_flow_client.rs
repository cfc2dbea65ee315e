use std::time::Duration;

use memori_login::LoginError;
use memori_login::TokenFlowClient;
use memori_login::WaitOutcome;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::method;
use wiremock::matchers::path;

const WAIT_BUDGET: Duration = Duration::from_secs(1);

async fn mock_create(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/token-flow/create"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mock_wait(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/token-flow/wait"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_returns_the_flow_fields() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/token-flow/create"))
        .and(body_partial_json(json!({
            "localhost_port": 4242,
            "next_url": "/home",
            "utm_source": "cli",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_flow_id": "flow-1",
            "wait_secret": "ws-1",
            "web_url": "https://memorilabs.ai/login?token_flow_id=flow-1",
            "code": "123456",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TokenFlowClient::new(&server.uri());
    let flow = client.create(4242, Some("/home"), Some("cli")).await?;

    assert_eq!(flow.flow_id, "flow-1");
    assert_eq!(flow.wait_secret.as_deref(), Some("ws-1"));
    assert_eq!(flow.code.as_deref(), Some("123456"));
    Ok(())
}

#[tokio::test]
async fn create_accepts_the_legacy_flow_id_field() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mock_create(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "flow_id": "flow-legacy" })),
    )
    .await;

    let client = TokenFlowClient::new(&server.uri());
    let flow = client.create(4242, None, None).await?;
    assert_eq!(flow.flow_id, "flow-legacy");
    assert!(flow.wait_secret.is_none());
    Ok(())
}

#[tokio::test]
async fn create_maps_5xx_to_service_unavailable() {
    let server = MockServer::start().await;
    mock_create(&server, ResponseTemplate::new(503)).await;

    let client = TokenFlowClient::new(&server.uri());
    let err = client.create(4242, None, None).await.expect_err("should fail");
    assert!(matches!(err, LoginError::ServiceUnavailable { .. }), "got {err:?}");
}

#[tokio::test]
async fn create_maps_4xx_to_invalid_request() {
    let server = MockServer::start().await;
    mock_create(&server, ResponseTemplate::new(422)).await;

    let client = TokenFlowClient::new(&server.uri());
    let err = client.create(4242, None, None).await.expect_err("should fail");
    assert!(matches!(err, LoginError::InvalidRequest { .. }), "got {err:?}");
}

#[tokio::test]
async fn create_without_a_flow_id_is_invalid() {
    let server = MockServer::start().await;
    mock_create(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "wait_secret": "ws" })),
    )
    .await;

    let client = TokenFlowClient::new(&server.uri());
    let err = client.create(4242, None, None).await.expect_err("should fail");
    assert!(matches!(err, LoginError::InvalidRequest { .. }), "got {err:?}");
}

#[tokio::test]
async fn create_maps_connection_failure_to_service_unavailable() {
    // Nothing listens on this port.
    let client = TokenFlowClient::new("http://127.0.0.1:9");
    let err = client.create(4242, None, None).await.expect_err("should fail");
    assert!(matches!(err, LoginError::ServiceUnavailable { .. }), "got {err:?}");
}

#[tokio::test]
async fn wait_reports_pending_on_a_timeout_body() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mock_wait(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "timeout": true })),
    )
    .await;

    let client = TokenFlowClient::new(&server.uri());
    let outcome = client.wait("flow-1", Some("ws-1"), WAIT_BUDGET).await?;
    assert!(matches!(outcome, WaitOutcome::Pending));
    Ok(())
}

#[tokio::test]
async fn wait_returns_the_issued_credential() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/token-flow/wait"))
        .and(body_partial_json(json!({
            "token_flow_id": "flow-1",
            "wait_secret": "ws-1",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "timeout": false,
            "api_key": "memori_key_123",
            "email": "dev@example.com",
        })))
        .mount(&server)
        .await;

    let client = TokenFlowClient::new(&server.uri());
    match client.wait("flow-1", Some("ws-1"), WAIT_BUDGET).await? {
        WaitOutcome::Activated(issued) => {
            assert_eq!(issued.api_key, "memori_key_123");
            assert_eq!(issued.email.as_deref(), Some("dev@example.com"));
        }
        WaitOutcome::Pending => panic!("expected activation"),
    }
    Ok(())
}

#[tokio::test]
async fn wait_accepts_the_token_alias() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mock_wait(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "token": "memori_key_alias" })),
    )
    .await;

    let client = TokenFlowClient::new(&server.uri());
    match client.wait("flow-1", None, WAIT_BUDGET).await? {
        WaitOutcome::Activated(issued) => assert_eq!(issued.api_key, "memori_key_alias"),
        WaitOutcome::Pending => panic!("expected activation"),
    }
    Ok(())
}

#[tokio::test]
async fn wait_maps_403_to_unauthorized() {
    let server = MockServer::start().await;
    mock_wait(&server, ResponseTemplate::new(403)).await;

    let client = TokenFlowClient::new(&server.uri());
    let err = client
        .wait("flow-1", Some("tampered"), WAIT_BUDGET)
        .await
        .expect_err("should fail");
    assert!(matches!(err, LoginError::Unauthorized), "got {err:?}");
}

#[tokio::test]
async fn wait_maps_404_to_flow_expired() {
    let server = MockServer::start().await;
    mock_wait(&server, ResponseTemplate::new(404)).await;

    let client = TokenFlowClient::new(&server.uri());
    let err = client
        .wait("flow-gone", None, WAIT_BUDGET)
        .await
        .expect_err("should fail");
    assert!(matches!(err, LoginError::FlowExpired), "got {err:?}");
}

#[tokio::test]
async fn wait_maps_5xx_to_service_unavailable() {
    let server = MockServer::start().await;
    mock_wait(&server, ResponseTemplate::new(500)).await;

    let client = TokenFlowClient::new(&server.uri());
    let err = client
        .wait("flow-1", None, WAIT_BUDGET)
        .await
        .expect_err("should fail");
    assert!(matches!(err, LoginError::ServiceUnavailable { .. }), "got {err:?}");
}
