use std::collections::BTreeMap;

use clap::Args;

use common::driver::{OWNER_OPTION, SOURCE_OPTION};
use knfs_daemon::http_server::api::client::ApiError;
use knfs_daemon::http_server::api::v0::volumes::CreateRequest;

#[derive(Args, Debug, Clone)]
pub struct Create {
    /// Volume name
    #[arg(long)]
    pub name: String,

    /// Remote export, nfs://host[:port]/path or host:/path
    #[arg(long)]
    pub source: String,

    /// User allowed to mount under the owner policy
    #[arg(long)]
    pub owner: Option<String>,

    /// Extra mount option as key=value, or a bare flag (repeatable)
    #[arg(long = "opt", value_parser = parse_mount_option)]
    pub opts: Vec<(String, String)>,
}

fn parse_mount_option(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
    if key.is_empty() {
        return Err(format!("invalid mount option '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

impl Create {
    pub fn request(&self) -> CreateRequest {
        let mut opts: BTreeMap<String, String> = self.opts.iter().cloned().collect();
        opts.insert(SOURCE_OPTION.to_string(), self.source.clone());
        if let Some(owner) = &self.owner {
            opts.insert(OWNER_OPTION.to_string(), owner.clone());
        }
        CreateRequest {
            name: self.name.clone(),
            opts,
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Create {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        client.call(self.request()).await?;
        Ok(format!("Volume {} created", self.name))
    }
}
