use axum::routing::get;
use axum::Router;

pub mod capabilities;
pub mod volumes;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/volumes", volumes::router(state.clone()))
        .route("/capabilities", get(capabilities::handler))
        .with_state(state)
}
