//! Subcommand handlers.

use crate::{Commands, ConfigAction, RunsAction};
use inquest_core::chat::run_chat;
use inquest_core::config::{InquestConfig, load_config, workspace_config_path, write_workspace_config};
use inquest_core::gateway::{GatewayState, ResearchRequestBody};
use inquest_core::mux::{EventSink, OutputMultiplexer, WireFormat};
use inquest_core::providers::create_provider;
use inquest_core::research::{Markers, ResearchEngine, RunRecord};
use inquest_core::search::SearchAdapter;
use inquest_core::types::{ChatMessage, RunEvent, Stage, StreamEvent};
use inquest_core::{LlmProvider, ResearchError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What every handler needs from the command line.
pub struct Context {
    pub workspace: PathBuf,
    pub data_dir: PathBuf,
    pub model: Option<String>,
}

impl Context {
    fn config(&self) -> anyhow::Result<InquestConfig> {
        let mut config = load_config(Some(&self.workspace), None)
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        for warning in config.research.validate() {
            warn!("{}", warning);
        }
        Ok(config)
    }
}

pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Research {
            topic,
            breadth,
            depth,
            format,
            no_save,
        } => handle_research(ctx, topic, breadth, depth, format, no_save).await,
        Commands::Chat { message } => handle_chat(ctx, message).await,
        Commands::Serve { host, port } => handle_serve(ctx, host, port).await,
        Commands::Runs { action } => handle_runs(ctx, action),
        Commands::Config { action } => handle_config(ctx, action),
    }
}

async fn handle_research(
    ctx: &Context,
    topic: String,
    breadth: Option<i64>,
    depth: Option<i64>,
    format: Option<String>,
    no_save: bool,
) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let format = match format {
        Some(f) => f.parse::<WireFormat>().map_err(anyhow::Error::msg)?,
        None => config.server.wire_format,
    };
    let request = ResearchRequestBody {
        topic: Some(topic),
        breadth,
        depth,
        ..ResearchRequestBody::default()
    }
    .validate(&config.research)?;

    let provider = create_provider(&config.llm)?;
    let search = SearchAdapter::new(
        inquest_tools::build_search_provider(&config.search)?,
        &config.search,
    );
    let engine = ResearchEngine::new(provider.clone(), search, config.research.clone())
        .with_results_per_query(config.search.results_per_query);

    let cancel = CancellationToken::new();
    let (sink, rx) = EventSink::channel(256, cancel.clone());
    let printer = tokio::spawn(print_stream(rx, multiplexer(&config, format)));
    let interrupt = cancel_on_ctrl_c(cancel.clone());

    let mut record = RunRecord::start(&request, provider.model_name());
    let result = engine.run(&request, &sink, &cancel).await;
    match &result {
        Ok(summary) => record.complete(summary),
        Err(ResearchError::Cancelled) => record.cancel(),
        Err(e) => {
            record.fail(e.to_string());
            let _ = sink
                .emit(RunEvent::new(Stage::Report, StreamEvent::Error(e.to_string())))
                .await;
        }
    }
    drop(sink);
    interrupt.abort();
    printer.await??;

    if !no_save {
        let path = record.save(&ctx.data_dir)?;
        info!(path = %path.display(), "Run saved");
    }
    eprintln!("\nrun {} {}", record.id, record.status);
    result.map(|_| ()).map_err(Into::into)
}

async fn handle_chat(ctx: &Context, message: String) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let provider: Arc<dyn LlmProvider> = create_provider(&config.llm)?;
    let markers = Markers {
        open: config.research.open_marker.clone(),
        close: config.research.close_marker.clone(),
    };

    let cancel = CancellationToken::new();
    let (sink, rx) = EventSink::channel(256, cancel.clone());
    let printer = tokio::spawn(print_stream(rx, multiplexer(&config, WireFormat::Markers)));
    let interrupt = cancel_on_ctrl_c(cancel.clone());

    let result = run_chat(
        provider,
        markers,
        vec![ChatMessage::user(message)],
        &sink,
        &cancel,
    )
    .await;
    drop(sink);
    interrupt.abort();
    printer.await??;
    println!();
    result.map(|_| ()).map_err(Into::into)
}

async fn handle_serve(ctx: &Context, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = ctx.config()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let provider = create_provider(&config.llm)?;
    let search = SearchAdapter::new(
        inquest_tools::build_search_provider(&config.search)?,
        &config.search,
    );
    info!(
        model = provider.model_name(),
        search = search.provider_name(),
        "Starting gateway"
    );
    let state = GatewayState::new(provider, search, config).with_runs_dir(ctx.data_dir.clone());

    inquest_core::gateway::run(Arc::new(state), async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down gateway");
    })
    .await?;
    Ok(())
}

fn handle_runs(ctx: &Context, action: RunsAction) -> anyhow::Result<()> {
    match action {
        RunsAction::List => {
            let runs = RunRecord::list(&ctx.data_dir);
            if runs.is_empty() {
                println!("No saved runs.");
                return Ok(());
            }
            for run in runs {
                println!(
                    "{}  {:<9}  {}  {:>3} learnings  {:>3} sources  {}",
                    run.id,
                    run.status.to_string(),
                    run.created_at.format("%Y-%m-%d %H:%M"),
                    run.learnings,
                    run.sources,
                    run.topic
                );
            }
            Ok(())
        }
        RunsAction::Show { id, json } => {
            let id = uuid::Uuid::parse_str(id.trim())
                .map_err(|e| anyhow::anyhow!("Invalid run id '{}': {}", id, e))?;
            let record = RunRecord::load(&ctx.data_dir, &id)
                .map_err(|e| anyhow::anyhow!("Cannot read run {}: {}", id, e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
                return Ok(());
            }
            println!("Topic:    {}", record.topic);
            println!("Status:   {}", record.status);
            println!("Model:    {}", record.model);
            println!("Budget:   breadth {}, depth {}", record.breadth, record.depth);
            println!(
                "Calls:    {} plan, {} search, {} synthesize",
                record.stats.plan_calls, record.stats.search_calls, record.stats.synthesize_calls
            );
            if let Some(error) = &record.error {
                println!("Error:    {}", error);
            }
            println!();
            match &record.report {
                Some(report) => println!("{}", report),
                None => {
                    println!("Learnings:");
                    for learning in &record.learnings {
                        println!("- {}", learning);
                    }
                }
            }
            Ok(())
        }
    }
}

fn handle_config(ctx: &Context, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = workspace_config_path(&ctx.workspace);
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            let path = write_workspace_config(&ctx.workspace, &InquestConfig::default())?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = ctx.config()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn multiplexer(config: &InquestConfig, format: WireFormat) -> OutputMultiplexer {
    OutputMultiplexer::with_markers(
        format,
        config.research.open_marker.as_str(),
        config.research.close_marker.as_str(),
    )
}

/// Write every event to stdout as it arrives.
async fn print_stream(
    mut rx: mpsc::Receiver<RunEvent>,
    mut mux: OutputMultiplexer,
) -> std::io::Result<()> {
    let mut out = tokio::io::stdout();
    while let Some(event) = rx.recv().await {
        out.write_all(mux.encode(&event).as_bytes()).await?;
        out.flush().await?;
    }
    out.write_all(mux.finish().as_bytes()).await?;
    out.flush().await
}

fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling");
            cancel.cancel();
        }
    })
}
