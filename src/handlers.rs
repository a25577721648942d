use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::counter::ActionId;
use crate::error::ThrottlerResult;
use crate::health::HealthStatus;
use crate::rate_limit_config::validate_action_id;
use crate::response::{CheckResponse, ReadyResponse, StatsResponse};
use crate::throttler::Throttler;

/// Shared application state
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub throttler: Throttler,
}

impl AppState {
    pub fn new(throttler: Throttler) -> SharedState {
        Arc::new(Self { throttler })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckRequest {
    #[validate(length(min = 1, max = 256))]
    pub caller: String,
    #[validate(length(max = 512), custom(function = "validate_action_id"))]
    pub action: String,
}

/// Decide one request on behalf of another service.
pub async fn check_rate_limit(
    State(state): State<SharedState>,
    Json(payload): Json<CheckRequest>,
) -> ThrottlerResult<Json<CheckResponse>> {
    payload.validate()?;

    let action = ActionId::new(payload.action.as_str());
    let limit = state
        .throttler
        .check_action(&payload.caller, &action)?
        .map(|policy| policy.max_count());

    Ok(Json(CheckResponse::allowed(payload.caller, payload.action, limit)))
}

pub async fn get_stats(State(state): State<SharedState>) -> Json<StatsResponse> {
    let limiter = state.throttler.rate_limiter();

    Json(StatsResponse {
        counters: limiter.len(),
        max_cache_size: limiter.max_cache_size(),
        rules: state.throttler.resolver().rule_count(),
        memoized_actions: state.throttler.resolver().memoized(),
        metrics: limiter.metrics().snapshot(),
    })
}

pub async fn health_check(State(state): State<SharedState>) -> Json<HealthStatus> {
    Json(HealthStatus::capture(&state.throttler))
}

pub async fn readiness_check() -> Json<ReadyResponse> {
    Json(ReadyResponse::ready())
}
