//! Tests for the HTTP registry client against a mock upstream.

use super::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> HttpRegistryClient {
    HttpRegistryClient::new("kvk", &server.uri(), Duration::from_secs(2))
        .expect("client construction")
}

#[tokio::test]
async fn test_successful_lookup_returns_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/68750110"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "handelsnaam": "CTN B.V." })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let payload = client.lookup("68750110").await.unwrap();

    assert_eq!(payload["handelsnaam"], serde_json::json!("CTN B.V."));
}

#[tokio::test]
async fn test_404_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/99999999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.lookup("99999999").await.unwrap_err();

    match error {
        LookupError::NotFound {
            registry,
            identifier,
        } => {
            assert_eq!(registry, "kvk");
            assert_eq!(identifier, "99999999");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_maps_to_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.lookup("68750110").await.unwrap_err();

    assert!(matches!(
        error,
        LookupError::UpstreamStatus { status: 503, .. }
    ));
}

#[tokio::test]
async fn test_unparseable_body_maps_to_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.lookup("68750110").await.unwrap_err();

    assert!(matches!(error, LookupError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_unreachable_upstream_maps_to_network_error() {
    // Nothing listens on this port.
    let client = HttpRegistryClient::new("kvk", "http://127.0.0.1:9", Duration::from_millis(500))
        .expect("client construction");

    let error = client.lookup("68750110").await.unwrap_err();

    assert!(matches!(error, LookupError::Network { .. }));
}

#[test]
fn test_trailing_slash_is_tolerated() {
    let client = HttpRegistryClient::new(
        "gleif",
        "https://api.gleif.org/api/v1/lei-records/",
        Duration::from_secs(2),
    )
    .expect("client construction");

    assert_eq!(
        client.lookup_url("HWUPKR0MPOU8FGXBT394"),
        "https://api.gleif.org/api/v1/lei-records/HWUPKR0MPOU8FGXBT394"
    );
    assert_eq!(client.registry(), "gleif");
}
