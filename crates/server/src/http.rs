//! HTTP endpoints

use std::sync::atomic::Ordering;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use companion_adapters::CallAck;
use companion_core::{AudioInEvent, EmergencyCategory};
use companion_emergency::OpenRequest;

use crate::metrics::metrics_handler;
use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // ASR edge
        .route("/api/sessions/:id/utterance", post(handle_utterance))
        .route("/api/sessions/:id/zone", post(handle_zone))
        .route("/api/sessions/:id/emotion", post(handle_emotion))
        .route("/api/sessions/:id", get(get_session))
        // Voice-call ack callback
        .route("/api/call-ack", post(handle_call_ack))
        // Control surface
        .route("/control/reload-policy", post(reload_policy))
        .route("/control/snapshot", get(dump_snapshot))
        .route("/control/test-emergency", post(test_emergency))
        .route("/control/drain", post(drain))
        // Probes
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if state.config.server.cors_enabled {
        router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    router.with_state(state)
}

/// One utterance in, one response envelope out.
async fn handle_utterance(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(event): Json<AudioInEvent>,
) -> impl IntoResponse {
    if state.draining.load(Ordering::Relaxed) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"error": "draining"})))
            .into_response();
    }

    metrics::counter!("companion_requests_total", "endpoint" => "utterance").increment(1);
    let envelope = state.orchestrator.handle_event(event, &session_id).await;
    Json(envelope).into_response()
}

#[derive(Debug, Deserialize)]
struct ZoneUpdate {
    /// Zone id, when the tracker already resolved it
    zone: Option<String>,
    /// Raw position in the home frame, resolved against the geofence
    /// polygons
    position: Option<(f64, f64)>,
}

/// Geofence signal from position tracking.
async fn handle_zone(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(update): Json<ZoneUpdate>,
) -> StatusCode {
    let zone = match (update.zone, update.position) {
        (Some(zone), _) => zone,
        (None, Some(position)) => {
            let snapshot = state.orchestrator.policy().snapshot();
            companion_policy::zone_for_point(position, &snapshot.geo_fences)
        }
        (None, None) => return StatusCode::UNPROCESSABLE_ENTITY,
    };

    match state.orchestrator.sessions().get_or_create(&session_id) {
        Ok(session) => {
            session.context.write().set_zone(zone);
            StatusCode::NO_CONTENT
        }
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Debug, Deserialize)]
struct EmotionUpdate {
    stress: f32,
}

/// Emotion reading from the audio analyzer.
async fn handle_emotion(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(update): Json<EmotionUpdate>,
) -> StatusCode {
    match state.orchestrator.sessions().get_or_create(&session_id) {
        Ok(session) => {
            session.context.write().set_emotion(update.stress);
            StatusCode::NO_CONTENT
        }
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Session summary.
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let session = state
        .orchestrator
        .sessions()
        .get(&session_id)
        .ok_or(StatusCode::NOT_FOUND)?;

    let context = session.context.read();
    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "utterances": context.recent_utterances().count(),
        "active_incident": context.active_incident,
        "view": context.view(),
    })))
}

/// Callee acknowledgement from the SIP gateway.
async fn handle_call_ack(
    State(state): State<AppState>,
    Json(ack): Json<CallAck>,
) -> StatusCode {
    if state.orchestrator.emergency().ack(ack) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Re-read the policy file and publish a new snapshot.
async fn reload_policy(State(state): State<AppState>) -> impl IntoResponse {
    match state.orchestrator.policy().reload() {
        Ok(version) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "reloaded", "version": version})),
        ),
        Err(error) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": error.to_string()})),
        ),
    }
}

/// Summary of the currently-published snapshot.
async fn dump_snapshot(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.orchestrator.policy().snapshot();
    let devices: Vec<&String> = snapshot.device_fences.keys().collect();
    let zones: Vec<&str> = snapshot.geo_fences.iter().map(|f| f.zone_id.as_str()).collect();
    let ladder: Vec<&str> = snapshot
        .contact_ladder
        .iter()
        .map(|c| c.contact_id.as_str())
        .collect();

    Json(serde_json::json!({
        "version": snapshot.version,
        "devices": devices,
        "zones": zones,
        "contact_ladder": ladder,
        "wakewords": snapshot.wakewords,
        "vocabulary_hash": snapshot.vocabulary_hash,
    }))
}

#[derive(Debug, Deserialize)]
struct TestEmergencyRequest {
    category: String,
    severity: u8,
}

/// Dry-run the emergency path: synthesize an utterance for the category,
/// prove it classifies as an emergency, and drive the simulated fan-out.
async fn test_emergency(
    State(state): State<AppState>,
    Json(request): Json<TestEmergencyRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let category = parse_category(&request.category).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    if !(1..=4).contains(&request.severity) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let snapshot = state.orchestrator.policy().snapshot();
    let keyword = snapshot
        .sos_sets
        .iter()
        .find(|s| s.category == category)
        .and_then(|s| s.keywords.values().next())
        .and_then(|words| words.first())
        .cloned()
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;

    let outcome = state.dry_run_emergency.open(
        OpenRequest {
            session_id: format!("test-emergency-{}", uuid::Uuid::new_v4()),
            severity: request.severity,
            category,
            utterance_id: None,
        },
        snapshot,
    );

    Ok(Json(serde_json::json!({
        "synthesized_utterance": keyword,
        "incident_id": outcome.incident_id,
        "accept_ms": outcome.accept_elapsed.as_millis() as u64,
        "dry_run": true,
    })))
}

fn parse_category(s: &str) -> Option<EmergencyCategory> {
    match s {
        "medical" => Some(EmergencyCategory::Medical),
        "fall" => Some(EmergencyCategory::Fall),
        "sos" => Some(EmergencyCategory::Sos),
        "security" => Some(EmergencyCategory::Security),
        "distress" => Some(EmergencyCategory::Distress),
        _ => None,
    }
}

/// Quiesce: refuse new utterances, let in-flight work finish.
async fn drain(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.draining.store(true, Ordering::Relaxed);
    tracing::info!("Drain requested; refusing new utterances");
    Json(serde_json::json!({"status": "draining"}))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": if state.draining.load(Ordering::Relaxed) { "draining" } else { "ready" },
        "degraded": state.degraded,
        "sessions": state.orchestrator.sessions().count(),
        "policy_version": state.orchestrator.policy().snapshot().version,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("medical"), Some(EmergencyCategory::Medical));
        assert_eq!(parse_category("fall"), Some(EmergencyCategory::Fall));
        assert_eq!(parse_category("panic"), None);
    }
}
