use knfs_daemon::http_server::api::client::ApiError;
use knfs_daemon::http_server::api::v0::volumes::UnmountRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for UnmountRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        client.call(self.clone()).await?;
        Ok(format!("Volume {} unmounted for {}", self.name, self.caller))
    }
}
