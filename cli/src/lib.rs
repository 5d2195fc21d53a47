use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use slide_chatgpt::{finish_reason_message, BackendKind, GenerationContext, HttpTransport};
use slide_common::text_after_last_brace;
use slide_core::{
    finalize_delta, Config, EngineError, ErrorReporter, GenerationQueue, InMemorySessionStore,
    StreamAccumulator,
};
use slide_protocol::Event;

#[derive(Parser)]
#[command(name = "slide")]
#[command(about = "Turn requests into slide decks through a streaming model backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file (defaults to .slide/config.toml and friends)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send one request through the generation queue, printing events as JSON lines
    Generate {
        /// What the deck should contain or how it should change
        prompt: String,
        /// Project whose deck and history the request belongs to
        #[arg(long, default_value = "default")]
        project: String,
        /// Named profile from the config
        #[arg(long)]
        profile: Option<String>,
        /// Override model (e.g., gpt-4o, llama3.1)
        #[arg(long)]
        model: Option<String>,
    },
    /// Decode a captured raw response body offline and print the final delta
    Replay {
        /// File holding the raw response exactly as received
        file: PathBuf,
        /// Backend that produced the file
        #[arg(long, default_value = "openai")]
        backend: BackendKind,
        /// Feed the file in pieces of this many bytes, as a stream would arrive
        #[arg(long, default_value = "64")]
        chunk_size: usize,
    },
    /// Write the default configuration to a file
    InitConfig {
        #[arg(default_value = ".slide/config.toml")]
        path: PathBuf,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::Generate {
            prompt,
            project,
            profile,
            model,
        } => {
            let mut config = load_config(cli.config.as_deref(), profile.as_deref())
                .map_err(|err| anyhow::anyhow!(ErrorReporter::format_user_error(&err)))?;
            if let Some(model) = model {
                config.model = model;
            }
            generate(config, project, prompt).await
        }
        Commands::Replay {
            file,
            backend,
            chunk_size,
        } => replay(&file, backend, chunk_size).await,
        Commands::InitConfig { path } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, profile: Option<&str>) -> Result<Config, EngineError> {
    let mut config = match path {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load_with_fallback(),
    };
    if let Some(profile) = profile {
        config.apply_profile(profile)?;
    }
    Ok(config)
}

async fn generate(config: Config, project: String, prompt: String) -> Result<()> {
    info!("using {} backend with model {}", config.backend, config.model);
    let (queue, mut events) = GenerationQueue::new(
        Arc::new(HttpTransport::new()),
        Arc::new(InMemorySessionStore::new()),
        config,
    );
    let item_id = queue.submit(project, prompt, Vec::new()).await;

    let mut failed = None;
    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.item_id() == Some(item_id) && event.is_terminal() {
            if let Event::Failed { message, .. } = event {
                failed = Some(message);
            }
            break;
        }
    }

    let Some(message) = failed else {
        return Ok(());
    };
    match queue.take_failure(item_id).await {
        Some(err) => anyhow::bail!(ErrorReporter::format_user_error(&err)),
        None => anyhow::bail!(message),
    }
}

async fn replay(file: &Path, backend: BackendKind, chunk_size: usize) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let mut accumulator = StreamAccumulator::new(backend.is_streaming());
    let mut rest = raw.as_str();
    while !rest.is_empty() {
        let mut cut = chunk_size.max(1).min(rest.len());
        while !rest.is_char_boundary(cut) {
            cut += 1;
        }
        let (piece, tail) = rest.split_at(cut);
        accumulator.push(piece);
        rest = tail;
    }
    accumulator.finish();

    let text = accumulator.text();
    let warning = accumulator
        .finish_reason()
        .and_then(|reason| finish_reason_message(GenerationContext::Generate, reason));
    let report = json!({
        "text": text,
        "thinking": accumulator.thinking(),
        "finish_reason": accumulator.finish_reason(),
        "warning": warning,
        "completion_message": text_after_last_brace(text),
        "delta": finalize_delta(text),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
