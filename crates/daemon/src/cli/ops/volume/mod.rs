use clap::{Args, Subcommand};

pub mod create;
pub mod get;
pub mod list;
pub mod mount;
pub mod path;
pub mod remove;
pub mod unmount;

use crate::cli::op::Op;
use knfs_daemon::http_server::api::v0::volumes::{
    GetRequest, ListRequest, MountRequest, PathRequest, RemoveRequest, UnmountRequest,
};

crate::command_enum! {
    (Create, create::Create),
    (Mount, MountRequest),
    (Unmount, UnmountRequest),
    (Path, PathRequest),
    (Get, GetRequest),
    (List, ListRequest),
    (Remove, RemoveRequest),
}

// Rename the generated Command to VolumeCommand for clarity
pub type VolumeCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Volume {
    #[command(subcommand)]
    pub command: VolumeCommand,
}

#[async_trait::async_trait]
impl Op for Volume {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
