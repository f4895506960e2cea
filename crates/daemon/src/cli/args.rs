pub use clap::Parser;

use std::path::PathBuf;

use url::Url;

#[derive(Parser, Debug)]
#[command(name = "knfsdriver")]
#[command(about = "Kerberized NFS volume driver")]
pub struct Args {
    /// Address of a running driver, for client commands
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Driver config file to take the address from when `--remote` is unset
    #[arg(long, global = true)]
    pub driver_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
