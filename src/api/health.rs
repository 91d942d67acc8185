use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "glm-relay is running",
        "config": {
            "model": config.features.model_name,
            "upstream_url": config.upstream.url,
            "upstream_model_id": config.upstream.model_id,
            "anonymous_token": config.upstream.anonymous_token,
            "client_keys_count": config.client_authentication.allowed_keys.len(),
            "features": {
                "think_tags_mode": config.features.think_tags_mode.to_string(),
                "log_level": config.features.log_level,
            }
        }
    }))
}
