//! Volume lifecycle endpoints
//!
//! Every handler forwards to the [`VolumeDriver`](common::driver::VolumeDriver)
//! and maps its errors onto HTTP statuses with an `{"err": ...}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use common::driver::DriverError;

pub mod create;
pub mod get;
pub mod list;
pub mod mount;
pub mod path;
pub mod remove;
pub mod unmount;

pub use create::{CreateRequest, CreateResponse};
pub use get::{GetRequest, GetResponse};
pub use list::{ListRequest, ListResponse};
pub use mount::{MountRequest, MountResponse};
pub use path::{PathRequest, PathResponse};
pub use remove::{RemoveRequest, RemoveResponse};
pub use unmount::{UnmountRequest, UnmountResponse};

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", post(create::handler).get(list::handler))
        .route("/:name", get(get::handler).delete(remove::handler))
        .route("/:name/mount", post(mount::handler))
        .route("/:name/unmount", post(unmount::handler))
        .route("/:name/path", get(path::handler))
        .with_state(state)
}

/// Body of mount and unmount requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerBody {
    pub caller: String,
}

/// A driver failure on its way back to the client.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct VolumeApiError(#[from] pub DriverError);

impl VolumeApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DriverError::Authentication(_) => StatusCode::SERVICE_UNAVAILABLE,
            DriverError::Authorization(_) => StatusCode::FORBIDDEN,
            DriverError::Mount(_) => StatusCode::BAD_GATEWAY,
            DriverError::NotFound(_) => StatusCode::NOT_FOUND,
            DriverError::NotMounted(_) | DriverError::VolumeBusy(_) => StatusCode::CONFLICT,
            DriverError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for VolumeApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.0.kind(), error = %self.0, "volume request failed");
        } else {
            tracing::debug!(kind = self.0.kind(), error = %self.0, "volume request rejected");
        }
        let body = serde_json::json!({ "err": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                DriverError::Authentication("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (DriverError::Authorization("x".into()), StatusCode::FORBIDDEN),
            (DriverError::Mount("x".into()), StatusCode::BAD_GATEWAY),
            (DriverError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (DriverError::NotMounted("x".into()), StatusCode::CONFLICT),
            (DriverError::VolumeBusy("x".into()), StatusCode::CONFLICT),
            (
                DriverError::InvalidArgument("x".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(VolumeApiError(error).into_response().status(), status);
        }
    }
}
