//! ARMATURE Server
//!
//! Tool worker binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use armature_server::{init_tracing, serve, Transport, Worker, WorkerConfig};
use clap::Parser;

#[derive(Parser)]
#[command(name = "armature-server")]
#[command(about = "ARMATURE tool worker", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Bind address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,
    /// Transport
    #[arg(short, long, value_enum, default_value_t = Transport::Http)]
    transport: Transport,
    /// Accept unauthenticated callers
    #[arg(long)]
    disable_auth: bool,
    /// Log as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = match &args.config {
        Some(path) => WorkerConfig::from_file(path)?,
        None => WorkerConfig::new(),
    };
    config.apply_env(std::env::vars());
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if args.disable_auth || args.transport == Transport::Stdio {
        config.disable_auth = true;
    }
    config.validate()?;

    let worker = Arc::new(Worker::with_builtins(Arc::new(config))?);
    serve(worker, args.transport).await
}
