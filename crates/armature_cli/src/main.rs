//! ARMATURE CLI
//!
//! Runs the worker, lists the built-in catalog, calls a tool locally and
//! mints worker tokens for testing.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use armature_core::{ToolCallRequest, ToolContextPayload, ToolReference};
use armature_server::config::SECRET_ENV;
use armature_server::{init_tracing, issue_token, serve, Transport, Worker, WorkerConfig};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use secrecy::SecretString;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Parser)]
#[command(name = "armature")]
#[command(about = "ARMATURE - typed tools behind one calling convention", long_about = None)]
struct Cli {
    /// Log as JSON
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker
    Serve {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Bind address
        #[arg(short, long)]
        bind: Option<String>,
        /// Transport
        #[arg(short, long, value_enum, default_value_t = Transport::Http)]
        transport: Transport,
        /// Accept unauthenticated callers
        #[arg(long)]
        disable_auth: bool,
    },
    /// List the built-in catalog
    Catalog {
        /// Print full definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Call one tool locally and print its output
    Call {
        /// Tool name: `Tool`, `Toolkit.Tool` or `Toolkit_Tool`
        tool: String,
        /// Inputs as a JSON object
        #[arg(short, long, default_value = "{}")]
        input: String,
        /// Secret for the call, `KEY=VALUE`; repeatable
        #[arg(short, long = "secret", value_parser = parse_key_value)]
        secrets: Vec<(String, String)>,
    },
    /// Mint a worker token
    Token {
        /// Worker secret; defaults to the environment
        #[arg(short, long)]
        secret: Option<String>,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn local_worker(secrets: Vec<(String, String)>) -> Result<Worker> {
    let mut config = WorkerConfig::new().without_auth();
    config.apply_env(std::env::vars());
    for (key, value) in secrets {
        config = config.with_tool_secret(key, value);
    }
    Ok(Worker::with_builtins(Arc::new(config))?)
}

async fn run_serve(
    config: Option<PathBuf>,
    bind: Option<String>,
    transport: Transport,
    disable_auth: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => WorkerConfig::from_file(&path)?,
        None => WorkerConfig::new(),
    };
    config.apply_env(std::env::vars());
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if disable_auth || transport == Transport::Stdio {
        config.disable_auth = true;
    }
    config.validate()?;
    let worker = Arc::new(Worker::with_builtins(Arc::new(config))?);
    serve(worker, transport)
        .await
        .map_err(|err| eyre!("{:#}", err))
}

async fn run_catalog(json: bool) -> Result<()> {
    let worker = local_worker(Vec::new())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&worker.definitions())?);
    } else {
        for tool in worker.catalog().iter() {
            let definition = &tool.definition;
            let marker = if definition.deprecation_message.is_some() {
                " (deprecated)"
            } else {
                ""
            };
            println!("{}{}\n    {}", tool.fully_qualified(), marker, definition.summary());
        }
        println!("{} tools, digest {}", worker.catalog().len(), worker.catalog().digest());
    }
    worker.shutdown().await;
    Ok(())
}

async fn run_call(tool: String, input: &str, secrets: Vec<(String, String)>) -> Result<()> {
    let inputs: Map<String, Value> = serde_json::from_str(input)
        .wrap_err("--input must be a JSON object, for example '{\"name\": \"World\"}'")?;
    let worker = local_worker(secrets)?;

    let name = worker
        .catalog()
        .iter()
        .find(|t| t.fully_qualified().mcp_name() == tool)
        .map_or(tool, |t| t.fully_qualified().dotted());
    debug!(tool = %name, "Calling tool locally");
    let request = ToolCallRequest {
        execution_id: None,
        tool: ToolReference {
            name,
            toolkit: None,
            version: None,
        },
        inputs,
        context: ToolContextPayload::default(),
    };

    let result = worker.call_tool(request).await;
    worker.shutdown().await;
    let response = result?;
    println!("{}", serde_json::to_string_pretty(&response.output)?);
    if let Some(error) = response.output.error {
        bail!("Tool call failed with {}", error.code);
    }
    Ok(())
}

fn run_token(secret: Option<String>, ttl_secs: u64) -> Result<()> {
    let secret = secret
        .or_else(|| std::env::var(SECRET_ENV).ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            eyre!(
                "No worker secret. Pass --secret or run `export {}=your_secret_here`",
                SECRET_ENV
            )
        })?;
    let token = issue_token(&SecretString::from(secret), Duration::from_secs(ttl_secs))?;
    println!("{}", token);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Serve {
            config,
            bind,
            transport,
            disable_auth,
        } => run_serve(config, bind, transport, disable_auth).await,
        Commands::Catalog { json } => run_catalog(json).await,
        Commands::Call {
            tool,
            input,
            secrets,
        } => run_call(tool, &input, secrets).await,
        Commands::Token { secret, ttl_secs } => run_token(secret, ttl_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("API_KEY=a=b").unwrap(),
            ("API_KEY".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("=x").is_err());
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::try_parse_from([
            "armature",
            "call",
            "Greetings.SayHello",
            "--input",
            "{\"name\":\"Ada\"}",
            "--secret",
            "API_KEY=k",
        ])
        .unwrap();
        match cli.command {
            Commands::Call { tool, secrets, .. } => {
                assert_eq!(tool, "Greetings.SayHello");
                assert_eq!(secrets, vec![("API_KEY".to_string(), "k".to_string())]);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
