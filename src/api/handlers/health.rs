use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use sqlx::Connection;
use std::sync::Arc;
use tracing::{debug, error, info_span, Instrument};
use utoipa::ToSchema;

use crate::api::AppState;
use crate::GIT_COMMIT_HASH;

#[derive(ToSchema, Serialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    store: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and store backend are healthy", body = Health),
        (status = 503, description = "Store backend is unhealthy", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let (store, healthy) = match state.pool() {
        Some(pool) => {
            let acquire_span = info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            );
            match pool.acquire().instrument(acquire_span).await {
                Ok(mut conn) => {
                    let ping_span =
                        info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
                    match conn.ping().instrument(ping_span).await {
                        Ok(()) => ("ok", true),
                        Err(error) => {
                            error!("Failed to ping database: {error}");
                            ("error", false)
                        }
                    }
                }
                Err(error) => {
                    error!("Failed to acquire database connection: {error}");
                    ("error", false)
                }
            }
        }
        None => ("memory", true),
    };

    if healthy {
        debug!("Store backend is healthy");
    } else {
        debug!("Store backend is unhealthy");
    }

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store.to_string(),
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) =
        format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>()
    {
        headers.insert("X-App", value);
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, headers, Json(health))
}
