//! Lesson Relay CLI
//!
//! Main entry point for running the live lesson relay server.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use lesson_relay::{create_router, AppState, Config};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Live lesson relay: keeps students on the step their teacher is presenting.
#[derive(Parser, Debug)]
#[command(name = "lesson-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to config file (default: ./lesson-relay.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ref bind) = args.bind {
        config.bind_address.clone_from(bind);
    }

    // Re-validate after overrides
    config.validate()?;

    print_config(&config);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind {addr}: {e}\n\nSuggestion: Check if another process is using the port or pass --port"
        )
    })?;

    let router = create_router(AppState::new(config));

    tracing::info!(addr = %addr, "Lesson relay listening");
    println!("Lesson relay running on ws://{addr}/ws");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Lesson relay stopped");
    Ok(())
}

/// Loads configuration from an explicit path, or from the working directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Listen address: {}", config.listen_addr());
    println!("  Teacher grace period: {}s", config.grace_period_secs);
    println!(
        "  Heartbeat: every {}s, close after {} missed pongs",
        config.heartbeat_interval_secs, config.max_missed_pongs
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    println!();
    println!("Shutting down...");
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_overrides_parse() {
        let args = Args::parse_from([
            "lesson-relay",
            "--port",
            "4100",
            "--bind",
            "0.0.0.0",
            "--json-logs",
        ]);
        assert_eq!(args.port, Some(4100));
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0"));
        assert!(args.json_logs);
        assert!(!args.verbose);
    }

    #[test]
    fn test_load_config_missing_explicit_path_fails() {
        let result = load_config(Some("/nonexistent/lesson-relay.json"));
        assert!(result.is_err());
    }
}
