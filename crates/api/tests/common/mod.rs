#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use seatpool_api::auth::jwt::{generate_access_token, JwtConfig};
use seatpool_api::config::ServerConfig;
use seatpool_api::router::build_app_router;
use seatpool_api::seed::import_licenses;
use seatpool_api::state::AppState;
use seatpool_core::clock::ManualClock;
use seatpool_core::coordinator::LicenseCoordinator;
use seatpool_core::license::{Caller, LeasePolicy, LicenseCredentials, NewLicense};
use seatpool_core::otp::{OtpSource, StaticOtpSource};
use seatpool_core::roles::{ROLE_ADMIN, ROLE_USER};
use seatpool_core::store::{LicenseStore, MemoryLicenseStore};
use seatpool_core::types::DbId;
use seatpool_core::usage::{MemoryUsageLogStore, UsageLogStore};
use seatpool_events::{EventBus, UsageRecorder};

/// Build a test `ServerConfig` with safe defaults and no external services.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        database_url: None,
        lease: LeasePolicy::default(),
        sweep_interval_secs: 0,
        otp_service_url: None,
        seed_file: None,
    }
}

/// A fully wired application over memory stores and a manual clock.
pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub otp: Arc<StaticOtpSource>,
    pub usage_store: Arc<dyn UsageLogStore>,
    pub config: ServerConfig,
    /// Ids of the seeded licenses `"1"`, `"2"` and `"3"`, in order.
    pub license_ids: Vec<DbId>,
}

impl TestApp {
    /// A clone of the router for one `oneshot` call.
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    pub fn token(&self, caller: &Caller) -> String {
        generate_access_token(caller, &self.config.jwt).expect("token generation should succeed")
    }

    /// Wait until the usage recorder has written at least `count` entries.
    pub async fn wait_for_usage_logs(&self, count: i64) {
        for _ in 0..100 {
            let page = self
                .usage_store
                .query(&Default::default())
                .await
                .expect("usage query should succeed");
            if page.total_count >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("usage recorder did not write {count} entries in time");
    }
}

pub fn alice() -> Caller {
    Caller::new(1, "Alice", ROLE_USER)
}

pub fn bob() -> Caller {
    Caller::new(2, "Bob", ROLE_USER)
}

pub fn admin() -> Caller {
    Caller::new(99, "Admin", ROLE_ADMIN)
}

fn seed_entry(no: &str) -> NewLicense {
    NewLicense {
        no: no.to_string(),
        credentials: LicenseCredentials {
            username: format!("shared{no}"),
            password: format!("secret{no}"),
            email: format!("license{no}@example.com"),
            email_password: format!("mail{no}"),
        },
    }
}

/// Build the application the way `main.rs` does, with three available
/// licenses and the usage recorder running.
pub async fn build_test_app() -> TestApp {
    let config = test_config();

    let license_store = Arc::new(MemoryLicenseStore::new());
    let entries: Vec<NewLicense> = ["1", "2", "3"].into_iter().map(seed_entry).collect();
    import_licenses(license_store.as_ref(), &entries)
        .await
        .expect("seeding should succeed");
    let license_ids = license_store
        .list()
        .await
        .expect("list should succeed")
        .into_iter()
        .map(|l| l.id)
        .collect();

    let usage_store: Arc<dyn UsageLogStore> = Arc::new(MemoryUsageLogStore::new());
    let event_bus = Arc::new(EventBus::default());
    tokio::spawn(UsageRecorder::run(
        Arc::clone(&usage_store),
        event_bus.subscribe(),
    ));

    let clock = Arc::new(ManualClock::default());
    let coordinator = Arc::new(
        LicenseCoordinator::new(license_store, clock.clone(), config.lease)
            .with_observer(event_bus.clone()),
    );

    let otp = Arc::new(StaticOtpSource::new());

    let state = AppState {
        coordinator,
        usage_store: Arc::clone(&usage_store),
        otp_source: Some(otp.clone() as Arc<dyn OtpSource>),
        event_bus,
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        clock,
        otp,
        usage_store,
        config,
        license_ids,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, method: Method, uri: &str, token: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = builder.body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token)).await
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(token)).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
