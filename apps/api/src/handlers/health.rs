use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::dto::{HealthDependencyStatus, HealthResponse};
use crate::state::AppState;

mod checks;

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ledger = match state.ledger_pool.clone() {
        Some(pool) => checks::check_postgres(pool).await,
        None => HealthDependencyStatus {
            status: "disabled",
            detail: None,
        },
    };
    let redis = checks::check_redis(state.redis_client.clone()).await;

    let healthy = ledger.status != "error" && redis.status != "error";
    let (status_code, status) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            ledger,
            redis,
        }),
    )
}
