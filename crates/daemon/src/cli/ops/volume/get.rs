use common::driver::VolumeInfo;
use knfs_daemon::http_server::api::client::ApiError;
use knfs_daemon::http_server::api::v0::volumes::GetRequest;

/// Multi-line description of one volume.
pub fn describe(volume: &VolumeInfo) -> String {
    let mut lines = vec![
        format!("name:       {}", volume.name),
        format!("target:     {}", volume.target),
        format!("state:      {}", volume.state),
        format!("refcount:   {}", volume.refcount),
    ];
    if let Some(owner) = &volume.owner {
        lines.push(format!("owner:      {}", owner));
    }
    if let Some(mountpoint) = &volume.mountpoint {
        lines.push(format!("mountpoint: {}", mountpoint.display()));
    }
    if !volume.options.is_empty() {
        let options = volume
            .options
            .iter()
            .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{}={}", k, v) })
            .collect::<Vec<_>>()
            .join(",");
        lines.push(format!("options:    {}", options));
    }
    lines.join("\n")
}

#[async_trait::async_trait]
impl crate::cli::op::Op for GetRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.clone()).await?;
        Ok(describe(&response.volume))
    }
}
