use clap::Args;

use common::driver::MountScope;
use knfs_daemon::http_server::api::client::ApiError;
use knfs_daemon::http_server::api::v0::capabilities::CapabilitiesRequest;

#[derive(Args, Debug, Clone)]
pub struct Capabilities;

#[async_trait::async_trait]
impl crate::cli::op::Op for Capabilities {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(CapabilitiesRequest {}).await?;
        let scope = match response.capabilities.scope {
            MountScope::Shared => "shared",
            MountScope::Exclusive => "exclusive",
        };
        Ok(format!("scope: {}", scope))
    }
}
