use axum::routing::get;
use axum::Router;

use crate::ServiceState;

mod credential;
mod data_source;
mod liveness;
mod readiness;
mod version;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/credential", get(credential::handler))
        .route("/livez", get(liveness::handler))
        .route("/readyz", get(readiness::handler))
        .route("/version", get(version::handler))
        .with_state(state)
}
