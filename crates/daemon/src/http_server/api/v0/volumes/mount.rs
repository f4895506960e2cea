use std::path::PathBuf;

use axum::extract::{Json, Path, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{CallerBody, VolumeApiError};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct MountRequest {
    /// Volume name
    #[arg(long)]
    pub name: String,
    /// OS user the mount is made for
    #[arg(long)]
    pub caller: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountResponse {
    pub mountpoint: PathBuf,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
    Json(body): Json<CallerBody>,
) -> Result<impl IntoResponse, VolumeApiError> {
    let mountpoint = state.driver().mount(&name, &body.caller).await?;
    Ok(Json(MountResponse { mountpoint }))
}

impl ApiRequest for MountRequest {
    type Response = MountResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(
                base_url,
                &["api", "v0", "volumes", &self.name, "mount"],
            ))
            .json(&CallerBody {
                caller: self.caller,
            })
    }
}
