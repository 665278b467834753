//! Inquest CLI: run deep research from the terminal or serve it over HTTP.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Inquest: streaming deep research with live reasoning and a cited report
#[derive(Parser, Debug)]
#[command(name = "inquest", version, about, long_about = None)]
struct Cli {
    /// Model to use (overrides config)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Research a topic and stream the trace and report to stdout
    Research {
        /// The research question
        topic: String,
        /// Queries planned per level
        #[arg(short, long)]
        breadth: Option<i64>,
        /// Recursion levels
        #[arg(short, long)]
        depth: Option<i64>,
        /// Output format: markers or events
        #[arg(short, long)]
        format: Option<String>,
        /// Do not save a run record
        #[arg(long)]
        no_save: bool,
    },
    /// Ask the model a single question
    Chat {
        /// The message to send
        message: String,
    },
    /// Run the HTTP gateway
    Serve {
        /// Host to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect saved research runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum RunsAction {
    /// List saved runs, newest first
    List,
    /// Show one run
    Show {
        /// Run id
        id: String,
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write a default config to .inquest/config.toml
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer on stderr; stdout carries the research stream.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let data_dir = inquest_core::config::data_dir();
    let log_dir = data_dir.join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "inquest.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let ctx = commands::Context {
        workspace,
        data_dir,
        model: cli.model,
    };
    commands::handle_command(cli.command, &ctx).await
}
