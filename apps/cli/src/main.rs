//! toolmux: connect to a set of MCP tool servers and use their tools
//!
//! ```text
//! toolmux --config servers.json tools
//! toolmux --config servers.json call rag:search --args '{"query": "rust"}'
//! toolmux --config servers.json watch
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use toolmux_core::ToolmuxConfig;
use toolmux_pool::McpManager;
use tracing::{error, info, warn};

/// Environment variable holding the session token for the restricted server
const TOKEN_ENV: &str = "TOOLMUX_AUTH_TOKEN";

/// Multiplex MCP tool servers behind one namespaced tool list.
#[derive(Parser, Debug)]
#[command(name = "toolmux")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, value_name = "FILE", default_value = "toolmux.json")]
    config: PathBuf,

    /// Session token for the restricted server (falls back to TOOLMUX_AUTH_TOKEN)
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every namespaced tool
    Tools,
    /// Print per-server connection status as JSON
    Status,
    /// Call a tool and print the result as JSON
    Call {
        /// Namespaced tool name, e.g. `rag:search`
        name: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Stay connected, running health checks until Ctrl-C
    Watch,
}

fn logs_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("toolmux")
        .join("logs")
}

/// Console on stderr (stdout carries command output) plus a daily log file.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let logs_dir = logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

    // Creates files like: toolmux.2026-01-22.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("toolmux")
        .filename_suffix("log")
        .build(&logs_dir)
        .context("Failed to create log file appender")?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info")
            .add_directive("toolmux_core=debug".parse()?)
            .add_directive("toolmux_pool=debug".parse()?)
            .add_directive("rmcp=warn".parse()?),
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn connect(config_path: &Path, token: Option<String>) -> Result<McpManager> {
    let config = ToolmuxConfig::load(config_path)?;
    let manager = McpManager::with_http_transport(config.settings.clone(), config.restricted.clone());

    if token.is_some() {
        manager.update_auth_token(token).await;
    }

    let report = manager
        .initialize(config.servers)
        .await
        .context("Failed to initialize tool servers")?;
    for (server, reason) in &report.failed {
        warn!(server = %server, error = %reason, "Server unavailable");
    }
    Ok(manager)
}

async fn watch(manager: &McpManager) -> Result<()> {
    let interval = manager.settings().health_check_interval();
    info!(?interval, "Watching tool servers; Ctrl-C to stop");

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately and the pool was just probed.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = manager.perform_health_checks().await;
                info!(
                    healthy = report.healthy.len(),
                    reconnected = ?report.reconnected,
                    dropped = ?report.dropped,
                    "Health check complete"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let token = args
        .token
        .or_else(|| std::env::var(TOKEN_ENV).ok())
        .filter(|t| !t.is_empty());
    let manager = connect(&args.config, token).await?;

    let outcome = match args.command {
        Command::Tools => {
            for (name, tool) in manager.get_all_tools() {
                println!("{}\t{}", name, tool.description.as_deref().unwrap_or(""));
            }
            Ok(())
        }
        Command::Status => serde_json::to_string_pretty(&manager.get_status())
            .map(|json| println!("{}", json))
            .map_err(Into::into),
        Command::Call { name, args } => {
            match serde_json::from_str::<Value>(&args).context("--args is not valid JSON") {
                Ok(arguments) => {
                    let result = manager.call_tool(&name, arguments).await;
                    serde_json::to_string_pretty(&result)
                        .map(|json| println!("{}", json))
                        .map_err(Into::into)
                }
                Err(e) => Err(e),
            }
        }
        Command::Watch => watch(&manager).await,
    };

    manager.disconnect().await;
    outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _guard = init_tracing()?;

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
