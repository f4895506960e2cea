use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::driver::Capabilities;

use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct CapabilitiesRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    pub capabilities: Capabilities,
}

pub async fn handler(State(state): State<ServiceState>) -> impl IntoResponse {
    Json(CapabilitiesResponse {
        capabilities: state.driver().capabilities(),
    })
}

impl ApiRequest for CapabilitiesRequest {
    type Response = CapabilitiesResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.get(endpoint(base_url, &["api", "v0", "capabilities"]))
    }
}
