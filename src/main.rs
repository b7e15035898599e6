use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use gitsleuth_core::SessionStatus;
use gitsleuth_core::bootstrap::AppBuilder;

/// Index a local repository and answer questions about it.
#[derive(Debug, Parser)]
#[command(name = "gitsleuth", version, about)]
struct Cli {
    /// Repository directory to index.
    repo: PathBuf,

    /// Questions to ask once indexing finishes; later ones see earlier answers.
    #[arg(required = true)]
    questions: Vec<String>,

    /// Config file (default: $GITSLEUTH_CONFIG or config/default.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let builder = AppBuilder::from_env(cli.config.as_deref())?;
    let service = builder.build_service()?;

    let repo = cli
        .repo
        .canonicalize()
        .with_context(|| format!("cannot open repository {}", cli.repo.display()))?;
    let task = service.start_indexing(&repo)?;
    let session_id = task.session_id().to_owned();

    let session = tokio::select! {
        session = task.finished() => session?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(session_id = %session_id, "interrupted while indexing");
            return Ok(());
        }
    };
    if session.status != SessionStatus::Ready {
        bail!("indexing {} failed: {}", repo.display(), session.message);
    }
    if let Some(report) = &session.report {
        tracing::info!(
            files = report.files_chunked,
            chunks = report.chunks_indexed,
            failed_batches = report.batches_failed,
            "repository ready"
        );
    }

    let mut conversation_id: Option<String> = None;
    for question in &cli.questions {
        let result = service
            .query(&session_id, question, conversation_id.as_deref())
            .await
            .with_context(|| format!("failed to answer {question:?}"))?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        conversation_id = Some(result.conversation_id);
    }
    Ok(())
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
