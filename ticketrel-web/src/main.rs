use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use ticketrel_core::Config;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Web front end for ticket relations")]
struct Args {
    /// Path to the configuration file
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// Path to the database (overrides the configuration)
    #[clap(long)]
    db: Option<PathBuf>,

    /// Address to listen on
    #[clap(long)]
    host: Option<String>,

    /// Port to listen on
    #[clap(long, short = 'p')]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.database = db;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.log_level),
    )
    .init();

    ticketrel_web::run(&config).await
}
