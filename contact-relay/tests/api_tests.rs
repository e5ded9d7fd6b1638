//! HTTP-level tests for the contact-relay API.
//!
//! Requests go through the full router (middleware included) with
//! `tower::ServiceExt::oneshot`; notification transports are fakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;

use contact_relay::api::middleware::RateLimitConfig;
use contact_relay::api::{ApiServer, ApiServerConfig, AppState};
use contact_relay::contact::{ContactService, SubscriptionService};
use contact_relay::database::models::{ContactSubmissionDbModel, PushSubscriptionDbModel};
use contact_relay::database::repositories::{
    ContactRepository, PushSubscriptionRepository, SqlxContactRepository,
    SqlxPushSubscriptionRepository,
};
use contact_relay::database::{DbPool, init_pool, run_migrations};
use contact_relay::notification::{
    DeliveryError, EmailChannel, EmailConfig, FanOutDispatcher, Mailer, NotificationTasks,
    OutgoingEmail, PushDelivery, WebPushChannel,
};
use contact_relay::{Error, Result};

const VAPID_KEY: &str =
    "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM";

async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        self.sent.lock().push(email);
        Ok(())
    }
}

#[derive(Default)]
struct CountingDelivery {
    attempts: AtomicUsize,
}

#[async_trait]
impl PushDelivery for CountingDelivery {
    async fn deliver(
        &self,
        _sub: &PushSubscriptionDbModel,
        _payload: &[u8],
    ) -> std::result::Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingContacts;

#[async_trait]
impl ContactRepository for FailingContacts {
    async fn create(&self, _submission: &ContactSubmissionDbModel) -> Result<()> {
        Err(Error::Other("disk I/O error".to_string()))
    }

    async fn get(&self, id: &str) -> Result<ContactSubmissionDbModel> {
        Err(Error::not_found("ContactSubmission", id))
    }

    async fn list_recent(&self, _limit: i64) -> Result<Vec<ContactSubmissionDbModel>> {
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<i64> {
        Ok(0)
    }
}

struct FailingSubscriptions;

#[async_trait]
impl PushSubscriptionRepository for FailingSubscriptions {
    async fn create(&self, _subscription: &PushSubscriptionDbModel) -> Result<()> {
        Err(Error::Other("disk I/O error".to_string()))
    }

    async fn list_all(&self) -> Result<Vec<PushSubscriptionDbModel>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn count(&self) -> Result<i64> {
        Ok(0)
    }
}

/// Everything wired against one in-memory database.
struct TestApp {
    router: Router,
    pool: DbPool,
    contact_service: Arc<ContactService>,
    mailer: Arc<RecordingMailer>,
    push: Arc<CountingDelivery>,
}

fn test_config() -> ApiServerConfig {
    ApiServerConfig {
        rate_limit: None,
        ..Default::default()
    }
}

async fn test_app(vapid_key: Option<&str>) -> TestApp {
    let pool = setup_test_db().await;
    let contacts = Arc::new(SqlxContactRepository::new(pool.clone()));
    let subscriptions = Arc::new(SqlxPushSubscriptionRepository::new(pool.clone()));

    let mailer = Arc::new(RecordingMailer::default());
    let email_config = EmailConfig {
        username: Some("owner@example.com".to_string()),
        password: Some("app-password".to_string()),
        ..Default::default()
    };

    let push = Arc::new(CountingDelivery::default());
    let dispatcher = Arc::new(FanOutDispatcher::new(subscriptions.clone(), push.clone()));

    let contact_service = Arc::new(
        ContactService::new(contacts, NotificationTasks::new())
            .with_channel(Arc::new(EmailChannel::new(email_config, mailer.clone())))
            .with_channel(Arc::new(WebPushChannel::new(dispatcher))),
    );

    let mut state = AppState::new()
        .with_pool(pool.clone())
        .with_contact_service(contact_service.clone())
        .with_subscription_service(Arc::new(SubscriptionService::new(subscriptions)));
    if let Some(key) = vapid_key {
        state = state.with_vapid_public_key(key);
    }

    TestApp {
        router: ApiServer::with_state(test_config(), state).build_router(),
        pool,
        contact_service,
        mailer,
        push,
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

mod contact_tests {
    use super::*;

    #[tokio::test]
    async fn test_submission_is_stored_and_relayed() {
        let app = test_app(None).await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/contact",
                json!({
                    "name": "Ada",
                    "email": "ada@example.com",
                    "service": "web",
                    "budget": "$5k",
                    "deadline": "2 weeks",
                    "message": "Hello"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "Form submitted successfully!" })
        );

        let stored = SqlxContactRepository::new(app.pool.clone())
            .list_recent(10)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        let record = &stored[0];
        assert_eq!(record.name, "Ada");
        assert_eq!(record.email, "ada@example.com");
        assert_eq!(record.service, "web");
        assert_eq!(record.budget, "$5k");
        assert_eq!(record.deadline, "2 weeks");
        assert_eq!(record.message, "Hello");

        assert!(app.contact_service.tasks().drain(Duration::from_secs(5)).await);

        let sent = app.mailer.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
        assert!(sent[0].html.contains("Ada"));
        assert!(sent[0].html.contains("ada@example.com"));

        // No subscriptions stored, so nothing was pushed.
        assert_eq!(app.push.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_push_reaches_stored_subscribers() {
        let app = test_app(None).await;
        let repo = SqlxPushSubscriptionRepository::new(app.pool.clone());
        for i in 0..3 {
            repo.create(&PushSubscriptionDbModel::new(
                format!("https://push.example/{i}"),
                "p256dh",
                "auth",
            ))
            .await
            .unwrap();
        }

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/contact",
                json!({ "name": "Ada", "email": "ada@example.com", "message": "Hi" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(app.contact_service.tasks().drain(Duration::from_secs(5)).await);
        assert_eq!(app.push.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_form_encoded_submission() {
        let app = test_app(None).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=Grace+Hopper&email=grace%40example.com&message=Hi"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = SqlxContactRepository::new(app.pool.clone())
            .list_recent(1)
            .await
            .unwrap();
        assert_eq!(stored[0].name, "Grace Hopper");
        assert_eq!(stored[0].email, "grace@example.com");
        assert_eq!(stored[0].service, "");
    }

    #[tokio::test]
    async fn test_invalid_submission_is_rejected() {
        let app = test_app(None).await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/contact",
                json!({ "name": "", "email": "not-an-email" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let count = SqlxContactRepository::new(app.pool.clone()).count().await.unwrap();
        assert_eq!(count, 0);
        assert!(app.mailer.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_client_error() {
        let app = test_app(None).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ not json"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_store_failure_returns_server_error() {
        let service = Arc::new(ContactService::new(
            Arc::new(FailingContacts),
            NotificationTasks::new(),
        ));
        let state = AppState::new().with_contact_service(service.clone());
        let router = ApiServer::with_state(test_config(), state).build_router();

        let response = router
            .oneshot(json_request(
                "POST",
                "/api/contact",
                json!({ "name": "Ada", "email": "ada@example.com" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Server error");
        assert!(!body.to_string().contains("disk I/O"));
        assert_eq!(service.tasks().in_flight(), 0);
    }
}

mod push_tests {
    use super::*;

    #[tokio::test]
    async fn test_vapid_key_is_served_as_text() {
        let app = test_app(Some(VAPID_KEY)).await;

        let response = app.router.clone().oneshot(get("/api/vapidPublicKey")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        assert_eq!(body_text(response).await, VAPID_KEY);
    }

    #[tokio::test]
    async fn test_missing_vapid_key_is_a_server_error() {
        let app = test_app(None).await;

        let response = app.router.clone().oneshot(get("/api/vapidPublicKey")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_text(response).await,
            contact_relay::api::routes::push::VAPID_NOT_CONFIGURED
        );
    }

    #[tokio::test]
    async fn test_subscribe_stores_subscription() {
        let app = test_app(Some(VAPID_KEY)).await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/subscribe",
                json!({
                    "endpoint": "https://fcm.googleapis.com/fcm/send/abc",
                    "keys": { "p256dh": "BPk", "auth": "c2VjcmV0" }
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "Subscribed successfully!" })
        );

        let all = SqlxPushSubscriptionRepository::new(app.pool.clone())
            .list_all()
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].endpoint, "https://fcm.googleapis.com/fcm/send/abc");
        assert_eq!(all[0].auth, "c2VjcmV0");
    }

    #[tokio::test]
    async fn test_subscribe_rejects_missing_keys() {
        let app = test_app(Some(VAPID_KEY)).await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/subscribe",
                json!({ "endpoint": "https://push.example/abc" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let count = SqlxPushSubscriptionRepository::new(app.pool.clone())
            .count()
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_subscribe_store_failure() {
        let state = AppState::new().with_subscription_service(Arc::new(SubscriptionService::new(
            Arc::new(FailingSubscriptions),
        )));
        let router = ApiServer::with_state(test_config(), state).build_router();

        let response = router
            .oneshot(json_request(
                "POST",
                "/api/subscribe",
                json!({
                    "endpoint": "https://push.example/abc",
                    "keys": { "p256dh": "BPk", "auth": "c2VjcmV0" }
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "Failed to save subscription");
    }
}

mod middleware_tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limit_applies_to_api_only() {
        let config = ApiServerConfig {
            rate_limit: Some(RateLimitConfig {
                max_requests: 2,
                window: Duration::from_secs(3600),
            }),
            ..Default::default()
        };
        let state = AppState::new().with_vapid_public_key(VAPID_KEY);
        let router = ApiServer::with_state(config, state).build_router();

        for _ in 0..2 {
            let response = router.clone().oneshot(get("/api/vapidPublicKey")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let limited = router.clone().oneshot(get("/api/vapidPublicKey")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key(header::RETRY_AFTER));
        let body = body_json(limited).await;
        assert_eq!(body["message"], "Too many requests, please try again later.");

        let health = router.clone().oneshot(get("/health/live")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_security_headers_are_set() {
        let app = test_app(None).await;

        let response = app.router.clone().oneshot(get("/health")).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert_eq!(headers[header::REFERRER_POLICY], "no-referrer");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let app = test_app(None).await;
        let huge = "x".repeat(128 * 1024);

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/contact",
                json!({ "name": "Ada", "email": "ada@example.com", "message": huge }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_static_files_are_served_as_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hello</h1>").unwrap();

        let config = ApiServerConfig {
            static_dir: Some(dir.path().to_path_buf()),
            ..test_config()
        };
        let router = ApiServer::with_state(config, AppState::new()).build_router();

        let response = router.clone().oneshot(get("/index.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<h1>hello</h1>");

        let missing = router.oneshot(get("/nope.html")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_database() {
        let app = test_app(None).await;

        let response = app.router.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"][0]["name"], "database");

        let ready = app.router.clone().oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_not_ready_when_database_closed() {
        let app = test_app(None).await;
        app.pool.close().await;

        let ready = app.router.clone().oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let app = test_app(None).await;

        let response = app.router.clone().oneshot(get("/api/openapi.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["paths"]["/api/contact"].is_object());
        assert!(body["paths"]["/api/subscribe"].is_object());
    }
}
