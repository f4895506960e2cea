use knfs_daemon::http_server::api::client::ApiError;
use knfs_daemon::http_server::api::v0::volumes::MountRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for MountRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        Ok(response.mountpoint.display().to_string())
    }
}
