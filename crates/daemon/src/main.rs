// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Capabilities, Daemon, Health, Version, Volume};

command_enum! {
    (Capabilities, Capabilities),
    (Daemon, Daemon),
    (Health, Health),
    (Version, Version),
    (Volume, Volume),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let remote = match cli::op::resolve_remote(args.remote, args.driver_config.as_deref()) {
        Ok(remote) => remote,
        Err(e) => {
            eprintln!("Error: Invalid driver address: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match cli::op::OpContext::new(remote) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: Failed to create API client: {}", e);
            std::process::exit(1);
        }
    };

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
