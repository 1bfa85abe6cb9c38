use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe. No per-provider health (there are no
/// external model providers in this crate); reports the things an operator
/// actually needs to know this process is keeping up: protocol version and
/// whether the persistence queue has anything parked in dead-letter.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "protocol": openmates_protocol::PROTOCOL_VERSION,
        "overloaded": state.persistence.is_overloaded(),
        "dead_letter_len": state.persistence.dead_letter_len(),
    }))
}
