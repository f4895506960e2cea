use std::path::PathBuf;

use axum::extract::{Json, Path, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use super::VolumeApiError;
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct PathRequest {
    /// Volume name
    #[arg(long)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResponse {
    pub mountpoint: PathBuf,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, VolumeApiError> {
    let mountpoint = state.driver().path(&name).await?;
    Ok(Json(PathResponse { mountpoint }))
}

impl ApiRequest for PathRequest {
    type Response = PathResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.get(endpoint(
            base_url,
            &["api", "v0", "volumes", &self.name, "path"],
        ))
    }
}
