//! Web push delivery against a local push service.
//!
//! A small axum server plays the push service: it records what it receives
//! and answers each endpoint with a fixed status.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use contact_relay::database::models::PushSubscriptionDbModel;
use contact_relay::database::repositories::{
    PushSubscriptionRepository, SqlxPushSubscriptionRepository,
};
use contact_relay::database::{init_pool, run_migrations};
use contact_relay::notification::{
    DeliveryError, FanOutDispatcher, PushDelivery, WebPushClient, WebPushConfig,
    generate_vapid_keys,
};

#[derive(Debug, Clone)]
struct ReceivedPush {
    id: String,
    authorization: String,
    content_encoding: String,
    ttl: String,
    body_len: usize,
}

#[derive(Clone, Default)]
struct PushServiceState {
    received: Arc<Mutex<Vec<ReceivedPush>>>,
}

async fn receive(
    State(state): State<PushServiceState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let seen_before = {
        let mut received = state.received.lock();
        let seen = received.iter().filter(|r| r.id == id).count();
        received.push(ReceivedPush {
            id: id.clone(),
            authorization: header_value("authorization"),
            content_encoding: header_value("content-encoding"),
            ttl: header_value("ttl"),
            body_len: body.len(),
        });
        seen
    };

    // Throttled endpoints answer 429 once, then accept.
    let throttled = |retry_after: Option<&'static str>| {
        if seen_before > 0 {
            return StatusCode::CREATED.into_response();
        }
        match retry_after {
            Some(secs) => (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, secs)]).into_response(),
            None => StatusCode::TOO_MANY_REQUESTS.into_response(),
        }
    };

    match id.as_str() {
        "gone" => StatusCode::GONE.into_response(),
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "broken" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "throttled-short" => throttled(Some("1")),
        "throttled-long" => throttled(Some("3600")),
        "throttled-bare" => throttled(None),
        _ => StatusCode::CREATED.into_response(),
    }
}

async fn start_push_service() -> (SocketAddr, PushServiceState) {
    let state = PushServiceState::default();
    let app = Router::new()
        .route("/push/{id}", post(receive))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn client() -> WebPushClient {
    let (public, private) = generate_vapid_keys();
    let config = WebPushConfig::new(public, &private, "mailto:owner@example.com").unwrap();
    WebPushClient::new(config).unwrap()
}

/// Subscription with a real receiver key pair, as a browser would create.
fn subscription(endpoint: String) -> PushSubscriptionDbModel {
    let receiver = p256::SecretKey::random(&mut OsRng);
    let p256dh = receiver.public_key().to_encoded_point(false);
    let mut auth = [0u8; 16];
    OsRng.fill_bytes(&mut auth);
    PushSubscriptionDbModel::new(
        endpoint,
        URL_SAFE_NO_PAD.encode(p256dh.as_bytes()),
        URL_SAFE_NO_PAD.encode(auth),
    )
}

#[tokio::test]
async fn test_delivery_sends_encrypted_request() {
    let (addr, service) = start_push_service().await;
    let client = client();

    let sub = subscription(format!("http://{addr}/push/ok"));
    client.deliver(&sub, br#"{"title":"t","body":"b"}"#).await.unwrap();

    let received = service.received.lock().clone();
    assert_eq!(received.len(), 1);
    let push = &received[0];
    assert_eq!(push.id, "ok");
    assert_eq!(push.content_encoding, "aes128gcm");
    assert!(!push.ttl.is_empty());
    assert!(push.authorization.starts_with("vapid t="));
    assert!(push.authorization.contains(&format!("k={}", client.vapid_public_key())));
    // Header (86 bytes) + plaintext + delimiter + tag (16 bytes).
    assert!(push.body_len > 86 + 16);
}

#[tokio::test]
async fn test_rejections_carry_status() {
    let (addr, _service) = start_push_service().await;
    let client = client();

    let gone = client
        .deliver(&subscription(format!("http://{addr}/push/gone")), b"{}")
        .await
        .unwrap_err();
    assert_eq!(gone.status(), Some(410));
    assert!(gone.is_gone());

    let broken = client
        .deliver(&subscription(format!("http://{addr}/push/broken")), b"{}")
        .await
        .unwrap_err();
    assert!(matches!(broken, DeliveryError::Rejected { status: 500, .. }));
    assert!(!broken.is_gone());
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client()
        .deliver(&subscription(format!("http://{addr}/push/ok")), b"{}")
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Transport(_)));
    assert!(!err.is_gone());
}

#[tokio::test]
async fn test_fan_out_prunes_gone_subscriptions() {
    let (addr, service) = start_push_service().await;

    let pool = init_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqlxPushSubscriptionRepository::new(pool));

    let ok = subscription(format!("http://{addr}/push/ok"));
    let broken = subscription(format!("http://{addr}/push/broken"));
    for sub in [
        &ok,
        &subscription(format!("http://{addr}/push/gone")),
        &subscription(format!("http://{addr}/push/missing")),
        &broken,
    ] {
        repo.create(sub).await.unwrap();
    }

    let dispatcher = FanOutDispatcher::new(repo.clone(), Arc::new(client()));
    let report = dispatcher.dispatch(br#"{"title":"t","body":"b"}"#).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.pruned, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(service.received.lock().len(), 4);

    let mut remaining: Vec<String> =
        repo.list_all().await.unwrap().into_iter().map(|s| s.id).collect();
    remaining.sort();
    let mut expected = vec![ok.id, broken.id];
    expected.sort();
    assert_eq!(remaining, expected);
}

#[tokio::test]
async fn test_short_retry_after_is_retried_once() {
    let (addr, service) = start_push_service().await;

    client()
        .deliver(&subscription(format!("http://{addr}/push/throttled-short")), b"{}")
        .await
        .unwrap();

    assert_eq!(service.received.lock().len(), 2);
}

#[tokio::test]
async fn test_throttled_without_usable_retry_after_fails() {
    let (addr, service) = start_push_service().await;
    let client = client();

    for id in ["throttled-long", "throttled-bare"] {
        let err = client
            .deliver(&subscription(format!("http://{addr}/push/{id}")), b"{}")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(429), "{id}");
        assert!(!err.is_gone());
    }

    // Neither endpoint was asked a second time.
    assert_eq!(service.received.lock().len(), 2);
}

#[tokio::test]
async fn test_fan_out_counts_throttled_retry_as_delivered() {
    let (addr, service) = start_push_service().await;

    let pool = init_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqlxPushSubscriptionRepository::new(pool));
    repo.create(&subscription(format!("http://{addr}/push/throttled-short")))
        .await
        .unwrap();
    repo.create(&subscription(format!("http://{addr}/push/throttled-bare")))
        .await
        .unwrap();

    let dispatcher = FanOutDispatcher::new(repo.clone(), Arc::new(client()));
    let report = dispatcher.dispatch(b"{}").await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.pruned, 0);
    assert_eq!(service.received.lock().len(), 3);
    assert_eq!(repo.count().await.unwrap(), 2);
}
