use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::time::timeout;

use super::data_source::*;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Ready while the service holds a valid ticket.
#[tracing::instrument]
pub async fn handler(data_src: StateDataSource) -> Response {
    match timeout(HEALTH_CHECK_TIMEOUT, data_src.is_ready()).await {
        Ok(Ok(readiness)) => {
            let msg = serde_json::json!({
                "status": "ok",
                "valid_until": readiness.valid_until,
                "renewal_failures": readiness.renewal_failures,
            });
            (StatusCode::OK, Json(msg)).into_response()
        }
        Ok(Err(e)) => handle_error(e),
        Err(_) => {
            let msg = serde_json::json!({
                "status": "failure",
                "message": "health check timed out"
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(msg)).into_response()
        }
    }
}

fn handle_error(err: DataSourceError) -> Response {
    tracing::debug!(error = %err, "not ready");
    match err {
        DataSourceError::CredentialUnavailable {
            renewal_failures,
            ref last_renewal_error,
        } => {
            let msg = serde_json::json!({
                "status": "failure",
                "message": err.to_string(),
                "renewal_failures": renewal_failures,
                "last_renewal_error": last_renewal_error,
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(msg)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    use crate::http_server::health::data_source::tests::*;

    async fn body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_handler_direct() {
        let response = handler(StateDataSource::new(Arc::new(MockReadiness::Ready))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["valid_until"], "2026-01-01T10:00:00Z");

        let response = handler(StateDataSource::new(Arc::new(
            MockReadiness::CredentialUnavailable,
        )))
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body(response).await;
        assert_eq!(json["status"], "failure");
        assert_eq!(json["message"], "no valid kerberos credential");
        assert_eq!(json["renewal_failures"], 3);
        assert_eq!(json["last_renewal_error"], "rejected");
    }
}
