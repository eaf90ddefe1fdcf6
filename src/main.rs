use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use askdocs::config::Config;
use askdocs::embedder::create_embedder;
use askdocs::llm::mock::MockLanguageModel;
use askdocs::llm::{LanguageModel, create_language_model};
use askdocs::orchestrator::{Orchestrator, Session};
use askdocs::parser::{RawFile, guess_content_type};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ask questions about PDF, CSV and spreadsheet files")]
struct Args {
    /// Configuration file (JSON). Defaults are used if it does not exist.
    #[arg(long, short, default_value = "askdocs.json")]
    config: PathBuf,

    /// Session name. Each session keeps its own store next to the configured path
    #[arg(long, default_value = "default")]
    session: String,

    /// Reopen the session's persisted index instead of starting empty
    #[arg(long)]
    resume: bool,

    /// Answer with the retrieved context instead of calling a language model
    #[arg(long)]
    offline: bool,

    /// Files to ingest
    files: Vec<PathBuf>,
}

async fn read_raw_file(path: &Path) -> Result<RawFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let content_type = guess_content_type(&name);
    Ok(RawFile::new(name, content_type, bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)?;
    config.validate()?;
    info!("Index path: {}", config.index_path);
    info!(
        "Chunking: size {}, overlap {}",
        config.chunk_size, config.chunk_overlap
    );

    let embedder = create_embedder(&config.embedding)?;
    let model: Arc<dyn LanguageModel> = if args.offline {
        Arc::new(MockLanguageModel::echo_context())
    } else {
        create_language_model(&config.llm)?
    };

    let orchestrator = Orchestrator::from_config(&config, embedder, model);
    let session = Session::with_id(args.session);

    if args.resume {
        orchestrator
            .resume(&session)
            .await
            .context("failed to reopen index")?;
        info!(
            "Reopened index at {}",
            orchestrator.index().for_session(session.id()).path().display()
        );
    }

    if !args.files.is_empty() {
        let mut files = Vec::with_capacity(args.files.len());
        for path in &args.files {
            files.push(read_raw_file(path).await?);
        }
        let summary = orchestrator.ingest(&session, files).await?;
        info!(
            "Ready: {} documents, {} chunks from {} files",
            summary.documents, summary.chunks, summary.files
        );
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match orchestrator.ask(&session, question).await {
            Ok(answer) => {
                stdout.write_all(answer.as_bytes()).await?;
                stdout.write_all(b"\n\n").await?;
            }
            Err(e @ askdocs::orchestrator::OrchestratorError::NotReady) => {
                warn!("{e}");
            }
            Err(e) => error!("{e}"),
        }
    }

    info!("Bye");
    Ok(())
}
