//! HTTP transport and delivery context tests against a mock server.

use std::sync::Arc;
use std::time::Duration;

use storefront_delivery::{
    ClientConfig, DeliveryConfig, DeliveryContext, DeliveryError, HttpTransport, ImageFormat,
    Payload, ResourceStatus, RetryConfig, StaticHints, Transport,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

fn fast_retry_config() -> DeliveryConfig {
    DeliveryConfig::default().with_retry(RetryConfig {
        max_retries: 2,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_fetch_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":1}]"#))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(ClientConfig::from(&DeliveryConfig::default())).unwrap();
    let body = transport
        .fetch(&format!("{}/api/products", server.uri()))
        .await
        .unwrap();

    assert_eq!(&body[..], br#"[{"id":1}]"#);
}

#[tokio::test]
async fn test_error_status_maps_to_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(ClientConfig::from(&DeliveryConfig::default())).unwrap();
    let err = transport
        .fetch(&format!("{}/api/orders", server.uri()))
        .await
        .unwrap_err();

    match err {
        DeliveryError::Http { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_configured_headers_and_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/css/main.css"))
        .and(header("x-storefront", "eu-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
        .expect(1)
        .mount(&server)
        .await;

    let config = DeliveryConfig::default().with_header("x-storefront", "eu-1");
    let client_config = ClientConfig::from(&config)
        .with_base_url(&server.uri())
        .unwrap();
    let transport = HttpTransport::new(client_config).unwrap();

    let body = transport.fetch("/css/main.css").await.unwrap();
    assert_eq!(&body[..], b"body{}");
}

#[tokio::test]
async fn test_context_loads_adapted_image_variant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/shoe.png"))
        .and(query_param("w", "400"))
        .and(query_param("q", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_HEADER.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let hints = StaticHints::default().with_effective_type("2g");
    let context = DeliveryContext::http(DeliveryConfig::default(), &hints).unwrap();

    let url = format!("{}/img/shoe.png", server.uri());
    let first = context.load_image(&url).await.unwrap();
    let second = context.load_image(&url).await.unwrap();

    assert!(matches!(first, Payload::Image { format: ImageFormat::Png, .. }));
    assert_eq!(first, second);
    assert_eq!(context.budget().metrics().image, PNG_HEADER.len() as u64);
}

#[tokio::test]
async fn test_context_falls_back_to_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let context = DeliveryContext::http(fast_retry_config(), &StaticHints::default()).unwrap();
    let url = format!("{}/img/missing.png", server.uri());

    match context.load_image_or_placeholder(&url).await {
        Payload::Image { format, .. } => assert_eq!(format, ImageFormat::Gif),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_context_fetch_json_is_memoized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stories"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"stories":[1,2]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let context = DeliveryContext::http(fast_retry_config(), &StaticHints::default()).unwrap();
    let url = format!("{}/api/stories", server.uri());

    let first = context.fetch_json(&url).await.unwrap();
    let second = context.fetch_json(&url).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first["stories"][1], 2);
    assert_eq!(context.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_context_retries_malformed_json_then_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .expect(2)
        .mount(&server)
        .await;

    let mut context =
        DeliveryContext::http(fast_retry_config(), &StaticHints::default()).unwrap();
    let url = format!("{}/api/broken", server.uri());

    let err = context.fetch_json(&url).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Decode { .. }));

    let id = storefront_delivery::resource_id(storefront_delivery::ResourceKind::Data, &url);
    assert_eq!(
        context.registry().entry(&id).unwrap().status,
        ResourceStatus::Error
    );

    context.shutdown();
    assert!(matches!(
        context.fetch_json(&url).await,
        Err(DeliveryError::ShutDown)
    ));
}

#[tokio::test]
async fn test_context_gates_optional_components_on_slow_links() {
    let slow = StaticHints::default().with_effective_type("2g");
    let context = DeliveryContext::new(
        DeliveryConfig::default(),
        Arc::new(HttpTransport::new(ClientConfig::from(&DeliveryConfig::default())).unwrap()),
        &slow,
    )
    .unwrap();

    assert!(context.should_load_component("header"));
    assert!(!context.should_load_component("recently-viewed"));
}
