use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use veil_common::observability::{init_logging, LogConfig};
use veil_common::{OutputFormat, SearchRequest};
use veil_config::{VeilConfig, VeilConfigLoader};
use veil_runtime::{VeilHandle, VeilRuntime};

mod render;
mod server;
mod wiring;

#[derive(Parser)]
#[command(name = "veil", version, about = "Privacy-preserving metasearch gateway")]
struct Cli {
    /// Configuration file; `VEIL__*` environment variables override it.
    #[arg(short, long, global = true, default_value = "veil.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Listen address, overriding `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one aggregated search and print the result.
    Search {
        text: String,
        /// Comma-separated categories.
        #[arg(long)]
        categories: Option<String>,
        /// Comma-separated engine ids.
        #[arg(long)]
        engines: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg: VeilConfig = VeilConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let log_path = init_logging(LogConfig {
        app_name: "veil",
        log_dir: cfg.logging.dir.as_ref().map(PathBuf::from),
        emit_stderr: cfg.logging.emit_stderr,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    })?;
    tracing::debug!(path = %log_path.display(), "logging.ready");

    let runtime = VeilRuntime::build("veil-worker", None)?;
    let handle = runtime.handle();
    let outcome = runtime.block_on(run(cli.command, cfg, handle));
    runtime.shutdown(Duration::from_secs(5));
    outcome
}

async fn run(command: Command, cfg: VeilConfig, handle: VeilHandle) -> Result<()> {
    match command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let wired = wiring::build_from_config(cfg)?;
            let sweeper = wired
                .cache
                .spawn_sweeper(wired.sweep_every, handle.shutdown_token());

            let signals = handle.clone();
            handle.spawn(async move { signals.wait_for_shutdown().await });

            let state = server::AppState {
                aggregator: wired.aggregator,
                shutdown: handle.shutdown_token(),
            };
            let served = server::serve(&bind, state).await;
            handle.request_shutdown();
            if let Err(err) = sweeper.await {
                tracing::warn!(error = %err, "cache.sweeper.join_failed");
            }
            served
        }
        Command::Search {
            text,
            categories,
            engines,
            language,
            page,
            format,
        } => {
            let format: OutputFormat = format.parse()?;
            let wired = wiring::build_from_config(cfg)?;
            let request = SearchRequest {
                text,
                categories: categories.into_iter().collect(),
                engines: engines.into_iter().collect(),
                language,
                page,
            };
            let result = wired.aggregator.search(request).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Html => print!("{}", render::results_page(&result)),
            }
            Ok(())
        }
    }
}
