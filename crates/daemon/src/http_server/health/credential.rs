use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::ServiceState;

/// Principal, expiry and renewal health of the service ticket.
pub async fn handler(State(state): State<ServiceState>) -> Response {
    (StatusCode::OK, Json(state.credentials().status())).into_response()
}
