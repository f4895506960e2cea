use knfs_daemon::http_server::api::client::ApiError;
use knfs_daemon::http_server::api::v0::volumes::ListRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for ListRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;

        if response.volumes.is_empty() {
            return Ok("No volumes found".to_string());
        }
        let output = response
            .volumes
            .iter()
            .map(|v| format!("{} ({}) {} [{}]", v.name, v.state, v.target, v.refcount))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(output)
    }
}
