//! `GET /health`: ready only when the store answers and every migration is applied.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use claimflow_db::{migrations, DbPool};
use serde::Serialize;
use tracing::error;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: Readiness,
    pub pending_migrations: Option<usize>,
    pub detail: &'static str,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, pending_migrations, detail) = match migrations::pending_count(&state.db_pool).await
    {
        Ok(0) => (Readiness::Ready, Some(0), "store reachable; schema current"),
        Ok(pending) => (Readiness::Degraded, Some(pending), "schema migrations pending"),
        Err(failure) => {
            error!(
                event_name = "system.health.store_unavailable",
                correlation_id = "health",
                error = %failure,
                "health check could not reach the store"
            );
            (Readiness::Degraded, None, "store unavailable")
        }
    };

    let code = match status {
        Readiness::Ready => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    let checked_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    (code, Json(HealthResponse { status, pending_migrations, detail, checked_at }))
}
