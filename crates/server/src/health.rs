use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use herald_slack::engine::BotEngine;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    engine: Arc<BotEngine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub commands: HealthCheck,
    pub checked_at: String,
}

pub fn router(engine: Arc<BotEngine>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { engine })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let commands = command_table_check(&state.engine);
    let ready = commands.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "herald-server runtime initialized".to_string(),
        },
        commands,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// A bot with nothing to dispatch to is not ready to answer anyone.
fn command_table_check(engine: &BotEngine) -> HealthCheck {
    let table = engine.dispatcher().command_table();
    if table.is_empty() {
        HealthCheck { status: "degraded", detail: "command table is empty".to_string() }
    } else {
        HealthCheck { status: "ready", detail: format!("{} commands registered", table.len()) }
    }
}
