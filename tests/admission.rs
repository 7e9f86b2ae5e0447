//! End-to-end admission scenarios driven through the HTTP router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use sluice::error::{Result, SluiceError};
use sluice::http::{router, AdmissionGate, ClassLimits, GateState, DENIED_BODY, ERROR_BODY};
use sluice::ratelimit::{CounterStore, Limiter, LimiterSettings, MemoryStore};

/// Store that behaves like a Redis client whose connection is gone.
struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn increment_with_init(&self, _key: &str, _ttl: Duration) -> Result<u64> {
        Err(SluiceError::Store("redis: client is closed".to_string()))
    }

    async fn set_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<()> {
        Err(SluiceError::Store("redis: client is closed".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<String> {
        Err(SluiceError::Store("redis: client is closed".to_string()))
    }
}

fn app(store: Arc<dyn CounterStore>, ip_limit: u64, token_limit: u64) -> Router {
    let limiter = Limiter::new(
        store,
        LimiterSettings {
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(10),
            store_timeout: Some(Duration::from_secs(1)),
        },
    );
    let gate = AdmissionGate::new(
        Arc::new(limiter),
        ClassLimits {
            address: ip_limit,
            credential: token_limit,
        },
    );
    router(GateState::new(
        Arc::new(gate),
        HeaderName::from_static("api_key"),
    ))
}

async fn send(app: &Router, remote: Option<&str>, api_key: Option<&str>) -> Response {
    let mut builder = Request::builder().uri("/");
    if let Some(key) = api_key {
        builder = builder.header("API_KEY", key);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    if let Some(remote) = remote {
        let addr: SocketAddr = remote.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
    }
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_eleventh_request_from_address_is_rejected() {
    let app = app(Arc::new(MemoryStore::new()), 10, 5);

    for n in 1..=10 {
        let response = send(&app, Some("127.0.0.1:12345"), None).await;
        assert_eq!(response.status(), StatusCode::OK, "request {}", n);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            (10 - n).to_string().as_str()
        );
        assert_eq!(body_text(response).await, "Rate limiter!");
    }

    let response = send(&app, Some("127.0.0.1:12345"), None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(body_text(response).await, DENIED_BODY);
}

#[tokio::test]
async fn test_other_addresses_keep_their_own_budget() {
    let app = app(Arc::new(MemoryStore::new()), 1, 5);

    assert_eq!(send(&app, Some("10.0.0.1:1"), None).await.status(), StatusCode::OK);
    assert_eq!(
        send(&app, Some("10.0.0.1:2"), None).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&app, Some("10.0.0.2:1"), None).await.status(), StatusCode::OK);
    assert_eq!(send(&app, Some("[::1]:1"), None).await.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_credential_bucket_is_independent_of_address_traffic() {
    let app = app(Arc::new(MemoryStore::new()), 1000, 5);

    let address_traffic: Vec<_> = (0..1000)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let remote = format!("127.0.0.1:{}", 20000 + i);
                send(&app, Some(&remote), None).await.status()
            })
        })
        .collect();

    let mut credential_statuses = Vec::new();
    for _ in 0..6 {
        let response = send(&app, Some("127.0.0.1:40000"), Some("key-A")).await;
        credential_statuses.push(response.status());
    }

    for status in futures::future::join_all(address_traffic).await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }
    assert!(credential_statuses[..5].iter().all(|s| *s == StatusCode::OK));
    assert_eq!(credential_statuses[5], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_burst_admits_exactly_the_limit() {
    let app = app(Arc::new(MemoryStore::new()), 25, 5);

    let burst: Vec<_> = (0..200)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let remote = format!("192.0.2.10:{}", 30000 + i);
                send(&app, Some(&remote), None).await.status()
            })
        })
        .collect();

    let statuses: Vec<StatusCode> = futures::future::join_all(burst)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 25);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
            .count(),
        175
    );
}

#[tokio::test]
async fn test_unreachable_store_fails_closed() {
    let app = app(Arc::new(UnreachableStore), 10, 5);

    for api_key in [None, Some("key-A")] {
        let response = send(&app, Some("127.0.0.1:12345"), api_key).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("x-ratelimit-limit").is_none());

        let body = body_text(response).await;
        assert_eq!(body, ERROR_BODY);
        assert!(!body.contains("redis"));
    }
}

#[tokio::test]
async fn test_empty_credential_header_counts_against_address() {
    let app = app(Arc::new(MemoryStore::new()), 1, 5);

    assert_eq!(
        send(&app, Some("127.0.0.1:1"), Some("")).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        send(&app, Some("127.0.0.1:1"), None).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_requests_without_connection_info_share_a_bucket() {
    let app = app(Arc::new(MemoryStore::new()), 2, 5);

    assert_eq!(send(&app, None, None).await.status(), StatusCode::OK);
    assert_eq!(send(&app, None, None).await.status(), StatusCode::OK);
    assert_eq!(
        send(&app, None, None).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}
