//! HTTP surface: state wiring, middleware layers, and the listener.
//!
//! The transport stays a thin binding to the core's two operations; backend
//! selection (in-process vs. shared Postgres) happens once, here, and the
//! handlers only ever see the trait objects behind [`AppState`].

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::otp::rate_limit::{MemoryRateLimiter, PgRateLimiter, RateLimitConfig, RateLimiter};
use crate::otp::store::{MemoryOtpStore, OtpStore, PgOtpStore};
use crate::otp::{OtpPolicy, OtpService};

pub mod email;
pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

/// Shared request state: the OTP core plus the optional Postgres pool
/// (kept around so the health probe can ping the backend).
pub struct AppState {
    service: OtpService,
    pool: Option<PgPool>,
}

impl AppState {
    #[must_use]
    pub fn new(service: OtpService, pool: Option<PgPool>) -> Self {
        Self { service, pool }
    }

    #[must_use]
    pub fn service(&self) -> &OtpService {
        &self.service
    }

    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: Option<String>,
    policy: OtpPolicy,
    rate_config: RateLimitConfig,
    sender: Arc<dyn email::EmailSender>,
    frontend_origin: Option<String>,
) -> Result<()> {
    let (store, limiter, pool): (Arc<dyn OtpStore>, Arc<dyn RateLimiter>, Option<PgPool>) =
        match dsn {
            Some(dsn) => {
                let pool = PgPoolOptions::new()
                    .min_connections(1)
                    .max_connections(5)
                    .max_lifetime(Duration::from_secs(60 * 2))
                    .test_before_acquire(true)
                    .connect(&dsn)
                    .await
                    .context("Failed to connect to database")?;
                (
                    Arc::new(PgOtpStore::new(pool.clone())) as Arc<dyn OtpStore>,
                    Arc::new(PgRateLimiter::new(pool.clone(), rate_config)) as Arc<dyn RateLimiter>,
                    Some(pool),
                )
            }
            None => (
                Arc::new(MemoryOtpStore::new()) as Arc<dyn OtpStore>,
                Arc::new(MemoryRateLimiter::new(rate_config)) as Arc<dyn RateLimiter>,
                None,
            ),
        };

    let service = OtpService::new(store, limiter, sender, policy);
    let state = Arc::new(AppState::new(service, pool));

    let cors = cors_layer(frontend_origin.as_deref())?;

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/v1/otp/send", post(handlers::otp::send))
        .route("/v1/otp/verify", post(handlers::otp::verify))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn cors_layer(frontend_origin: Option<&str>) -> Result<CorsLayer> {
    let layer = match frontend_origin {
        Some(origin) => CorsLayer::new()
            .allow_headers([CONTENT_TYPE])
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(AllowOrigin::exact(exact_origin(origin)?))
            .allow_credentials(true),
        // The origin-less default mirrors an open static frontend; credentials
        // cannot be combined with a wildcard origin.
        None => CorsLayer::new()
            .allow_headers([CONTENT_TYPE])
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(Any),
    };
    Ok(layer)
}

fn exact_origin(frontend_origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_origin)
        .with_context(|| format!("Invalid frontend origin: {frontend_origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend origin must include a valid host: {frontend_origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
