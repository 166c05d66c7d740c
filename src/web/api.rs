//! Defines the Axum API routes and handlers.

use crate::error::MotorError;
use crate::motor::PinAssignment;
use crate::registry::MotorRegistry;
use crate::web::models::{
    CommandResponse, ConfigResponse, GpioInfoResponse, MotorPins, PinsResponse, ReassignRequest,
    StatusResponse, StepRequest,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

pub type AppState = Arc<MotorRegistry>;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(registry: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/pins", get(get_pins))
        .route("/api/v1/gpio", get(get_gpio_info))
        .route("/api/v1/step", post(step_handler))
        .route("/api/v1/reassign", post(reassign_handler))
        .route("/api/v1/emergency_stop", post(emergency_stop_handler))
        .route("/api/v1/clear_emergency_stop", post(clear_emergency_stop_handler))
        .with_state(registry)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Helper to create a JSON error response with a message and status code
fn json_error(kind: &str, message: &str, status: StatusCode) -> Response {
    let body = serde_json::json!({
        "status": "error",
        "kind": kind,
        "message": message,
        "timestamp": timestamp(),
    });
    (status, Json(body)).into_response()
}

fn motor_error(err: &MotorError) -> Response {
    let status = match err {
        MotorError::Config(_) | MotorError::InvalidCount { .. } => StatusCode::BAD_REQUEST,
        MotorError::UnknownMotor(_) => StatusCode::NOT_FOUND,
        MotorError::MotorBusy(_) | MotorError::Interrupted { .. } => StatusCode::CONFLICT,
        MotorError::EmergencyStopActive => StatusCode::LOCKED,
        MotorError::Hardware(_) | MotorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(err.kind(), &err.to_string(), status)
}

fn command_ok(message: String) -> Response {
    let body = CommandResponse { status: "success", message, timestamp: timestamp() };
    (StatusCode::OK, Json(body)).into_response()
}

/// Live motor activity and the emergency-stop flag.
async fn get_status(State(registry): State<AppState>) -> Response {
    let body = StatusResponse {
        status: "success",
        emergency_stop: registry.is_emergency_stopped(),
        motors: registry.status(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Motor wiring with physical header positions.
async fn get_config(State(registry): State<AppState>) -> Response {
    let board = registry.board();
    let config = registry
        .document()
        .iter()
        .map(|(name, a)| {
            let pins = MotorPins {
                step_pin: a.step_pin,
                dir_pin: a.dir_pin,
                step_pin_physical: board.physical(a.step_pin),
                dir_pin_physical: board.physical(a.dir_pin),
            };
            (name.to_string(), pins)
        })
        .collect();
    (StatusCode::OK, Json(ConfigResponse { status: "success", config })).into_response()
}

/// Every board pin and who is using it.
async fn get_pins(State(registry): State<AppState>) -> Response {
    let board = registry.board();
    let body = PinsResponse {
        status: "success",
        board: board.name().to_string(),
        available_pins: board.usage(&registry.document()),
    };
    (StatusCode::OK, Json(body)).into_response()
}

async fn get_gpio_info(State(registry): State<AppState>) -> Response {
    let actuator = registry.actuator();
    let mut active_pins: Vec<_> = registry
        .document()
        .iter()
        .flat_map(|(_, a)| a.pins())
        .collect();
    active_pins.sort_unstable();
    let body = GpioInfoResponse {
        status: "success",
        backend: actuator.name(),
        mock_mode: actuator.is_simulated(),
        message: if actuator.is_simulated() {
            "Running in mock mode - no real GPIO access"
        } else {
            "Real GPIO mode"
        },
        emergency_stop: registry.is_emergency_stopped(),
        active_pins,
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Move a motor. Responds once the move has finished or failed.
async fn step_handler(State(registry): State<AppState>, Json(payload): Json<StepRequest>) -> Response {
    let Some((direction, count)) = payload.motion() else {
        return json_error(
            "invalid_count",
            "count must not be negative when a direction is given",
            StatusCode::BAD_REQUEST,
        );
    };
    match registry
        .step_with_half_period(&payload.name, direction, count, payload.half_period_us)
        .await
    {
        Ok(()) => command_ok(format!("Moved {} {} steps {}", payload.name, count, direction)),
        Err(e) => motor_error(&e),
    }
}

async fn reassign_handler(State(registry): State<AppState>, Json(payload): Json<ReassignRequest>) -> Response {
    let assignment = PinAssignment::new(payload.step_pin, payload.dir_pin);
    match registry.reassign_pins(&payload.name, assignment).await {
        Ok(()) => command_ok(format!("Pin configuration for {} updated successfully", payload.name)),
        Err(e) => motor_error(&e),
    }
}

async fn emergency_stop_handler(State(registry): State<AppState>) -> Response {
    let interrupted = registry.emergency_stop().await;
    command_ok(format!(
        "Emergency stop activated. All motors stopped ({} interrupted).",
        interrupted
    ))
}

async fn clear_emergency_stop_handler(State(registry): State<AppState>) -> Response {
    let message = if registry.clear_emergency_stop() {
        "Emergency stop cleared. Motors may be commanded again."
    } else {
        "Emergency stop was not active."
    };
    command_ok(message.to_string())
}
