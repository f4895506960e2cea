use knfs_daemon::http_server::api::client::ApiError;
use knfs_daemon::http_server::api::v0::volumes::RemoveRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for RemoveRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        client.call(self.clone()).await?;
        Ok(format!("Volume {} removed", self.name))
    }
}
