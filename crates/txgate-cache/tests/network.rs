//! Status classification of the HTTP producer.

use std::time::Duration;

use serde_json::json;
use txgate_cache::{DataSourceError, NetworkClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> NetworkClient {
    NetworkClient::new(Duration::from_millis(500)).unwrap()
}

#[tokio::test]
async fn test_success_returns_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chains/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"chainId": "1"})))
        .expect(1)
        .mount(&server)
        .await;

    let value = client()
        .get_json(&format!("{}/api/v1/chains/1", server.uri()))
        .await
        .unwrap();
    assert_eq!(value, json!({"chainId": "1"}));
}

#[tokio::test]
async fn test_404_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client()
        .get_json(&format!("{}/api/v1/chains/999", server.uri()))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client().get_json(&server.uri()).await.unwrap_err();
    assert!(matches!(err, DataSourceError::Upstream { status: Some(503), .. }));
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = client().get_json(&server.uri()).await.unwrap_err();
    assert!(matches!(err, DataSourceError::Upstream { status: None, .. }));
}

#[tokio::test]
async fn test_invalid_body_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client().get_json(&server.uri()).await.unwrap_err();
    assert!(!err.is_not_found());
}
