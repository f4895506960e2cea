use axum::extract::{Json, Path, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{CallerBody, VolumeApiError};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct UnmountRequest {
    /// Volume name
    #[arg(long)]
    pub name: String,
    /// OS user releasing the mount
    #[arg(long)]
    pub caller: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmountResponse {
    pub unmounted: bool,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
    Json(body): Json<CallerBody>,
) -> Result<impl IntoResponse, VolumeApiError> {
    state.driver().unmount(&name, &body.caller).await?;
    Ok(Json(UnmountResponse { unmounted: true }))
}

impl ApiRequest for UnmountRequest {
    type Response = UnmountResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(
                base_url,
                &["api", "v0", "volumes", &self.name, "unmount"],
            ))
            .json(&CallerBody {
                caller: self.caller,
            })
    }
}
