use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use hivebot_db::DbPool;
use hivebot_dispatch::RuntimeState;
use serde::Serialize;
use tokio::sync::watch;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    runtime: watch::Receiver<RuntimeState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub dispatcher: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, runtime: watch::Receiver<RuntimeState>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, runtime })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let dispatcher = dispatcher_check(*state.runtime.borrow());
    let ready = database.status == "ready" && dispatcher.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        dispatcher,
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn dispatcher_check(state: RuntimeState) -> HealthCheck {
    let status = if state == RuntimeState::Running { "ready" } else { "degraded" };
    HealthCheck { status, detail: format!("dispatcher is {}", state.as_str()) }
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match hivebot_db::ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
