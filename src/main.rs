use std::net::{IpAddr, SocketAddr};

use clap::{Parser, Subcommand};
use etelemetry_server::config::Config;
use etelemetry_server::server::{init_logging, run_server};

#[derive(Parser)]
#[command(name = "etelemetry-server")]
#[command(version, about = "Version lookup and usage statistics service for forge projects")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Up {
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let _guard = init_logging(config.log_dir.as_deref());

    match cli.command {
        Command::Up { host, port } => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(run_server(config, SocketAddr::new(host, port))),
    }
}
