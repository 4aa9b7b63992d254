// HttpDeliveryClient tests against a mock collector

mod common;

use common::{aggregate, snapshot};
use std::time::Duration;
use telemetry_agent::delivery::{DeliveryClient, HttpDeliveryClient};
use telemetry_agent::error::DeliveryError;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpDeliveryClient {
    HttpDeliveryClient::new(
        &format!("{}/api/metrics", server.uri()),
        "secret-key",
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn deliver_posts_json_with_api_key() {
    let server = MockServer::start().await;
    let payload = aggregate(20.0);
    Mock::given(method("POST"))
        .and(path("/api/metrics"))
        .and(header("X-API-Key", "secret-key"))
        .and(header("content-type", "application/json"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client_for(&server).deliver(&payload).await.unwrap();
    assert_eq!(ack.status, 200);
}

#[tokio::test]
async fn server_error_is_a_status_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client_for(&server).deliver(&aggregate(1.0)).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Status(500)), "{err:?}");
}

#[tokio::test]
async fn only_200_counts_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let err = client_for(&server).deliver(&aggregate(1.0)).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Status(201)), "{err:?}");
}

#[tokio::test]
async fn rejected_key_is_a_status_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client_for(&server).deliver(&aggregate(1.0)).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Status(401)), "{err:?}");
}

#[tokio::test]
async fn slow_collector_times_out_as_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = HttpDeliveryClient::new(
        &format!("{}/api/metrics", server.uri()),
        "k",
        Duration::from_millis(200),
    )
    .unwrap();
    let err = client.deliver(&aggregate(1.0)).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_collector_is_a_transport_error() {
    // Bind then drop a listener so its port is (very likely) closed.
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let client =
        HttpDeliveryClient::new(&format!("{uri}/api/metrics"), "k", Duration::from_secs(2)).unwrap();
    let err = client.deliver(&aggregate(1.0)).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn test_connection_posts_collector_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/metrics"))
        .and(header("X-API-Key", "secret-key"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let snap = snapshot(3.0);
    let ack = client_for(&server).test_connection(&snap).await.unwrap();
    assert_eq!(ack.status, 200);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["timestamp"].is_string());
    assert_eq!(body["system_info"]["hostname"], "test-host");
    let cpu = &body["metrics"]["cpu"];
    assert_eq!(cpu["usage_percent"], 3.0);
    assert_eq!(cpu["min"], 3.0);
    assert_eq!(cpu["max"], 3.0);
    assert_eq!(cpu["std_dev"], 0.0);
    assert!(body["metrics"]["memory"]["peak_usage"].is_u64());
    assert!(body["metrics"]["network"]["bytes_sent_total"].is_u64());
    // Raw snapshot keys must not leak into the envelope.
    assert!(body.get("cpu").is_none());
    assert!(body.get("collected_at").is_none());
}
