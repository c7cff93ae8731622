mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    CharacterNgramEmbedder, ChromaStore, Embedder, IngestionReport, MemoryVectorStore,
    OllamaEmbedder, OllamaGenerator, RagContext, RagSettings, VectorStore,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_TOP_K,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const PROMPT_FOR_INPUT: &str = "Please enter a question.";

pub type AppContext = RagContext<
    Box<dyn Embedder + Send + Sync>,
    Box<dyn VectorStore + Send + Sync>,
    OllamaGenerator,
>;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    /// In-process index persisted as a JSON snapshot.
    Memory,
    /// Chroma server over HTTP.
    Chroma,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    /// Hashed character trigrams, no model server needed.
    Ngram,
    /// Ollama `/api/embeddings`.
    Ollama,
}

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder holding the source PDFs
    #[arg(long, env = "RAG_PDF_DIR", default_value = "./pdfs", global = true)]
    pdf_dir: PathBuf,

    /// Folder receiving one text artifact per PDF page
    #[arg(long, env = "RAG_ARTIFACT_DIR", default_value = "outputs", global = true)]
    artifact_dir: PathBuf,

    /// Words per chunk
    #[arg(long, default_value_t = 500, global = true)]
    chunk_size: usize,

    /// Words shared by consecutive chunks; must be below the chunk size
    #[arg(long, default_value_t = 100, global = true)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, default_value_t = DEFAULT_TOP_K, global = true)]
    top_k: usize,

    /// Vector store backend
    #[arg(long, value_enum, env = "RAG_STORE", default_value = "memory", global = true)]
    store: StoreKind,

    /// Snapshot file for the memory store
    #[arg(long, env = "RAG_STORE_PATH", default_value = "TechTriad/index.json", global = true)]
    store_path: PathBuf,

    /// Chroma base URL
    #[arg(long, env = "CHROMA_URL", default_value = "http://localhost:8000", global = true)]
    chroma_url: String,

    /// Chroma collection name
    #[arg(long, default_value = "company-capabilities", global = true)]
    collection: String,

    /// Embedding backend
    #[arg(long, value_enum, env = "RAG_EMBEDDER", default_value = "ngram", global = true)]
    embedder: EmbedderKind,

    /// Ollama embedding model
    #[arg(long, env = "RAG_EMBEDDING_MODEL", default_value = "all-minilm", global = true)]
    embedding_model: String,

    /// Vector width of the n-gram embedder
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS, global = true)]
    embedding_dimensions: usize,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL, global = true)]
    ollama_url: String,

    /// Ollama generation model
    #[arg(long, env = "OLLAMA_MODEL", default_value = DEFAULT_OLLAMA_MODEL, global = true)]
    ollama_model: String,

    /// Seconds before a generation request is abandoned
    #[arg(long, default_value_t = 120, global = true)]
    generation_timeout_secs: u64,

    /// Seconds before an embedding request is abandoned
    #[arg(long, default_value_t = 30, global = true)]
    embedding_timeout_secs: u64,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "RAG_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Segment, chunk and index the PDF folder, then exit.
    Ingest,
    /// Answer a single question.
    Ask {
        /// Question text
        #[arg(long)]
        question: String,
    },
    /// Answer questions typed on stdin until `exit`.
    Chat,
    /// Serve the question endpoint over HTTP.
    Serve {
        /// Address to bind (host:port)
        #[arg(long, env = "RAG_BIND", default_value = "127.0.0.1:5000")]
        bind: String,
    },
}

impl Cli {
    fn rag_settings(&self) -> RagSettings {
        RagSettings {
            artifact_dir: self.artifact_dir.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
        }
    }

    fn build_embedder(&self) -> anyhow::Result<Box<dyn Embedder + Send + Sync>> {
        let embedder: Box<dyn Embedder + Send + Sync> = match self.embedder {
            EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder {
                dimensions: self.embedding_dimensions,
            }),
            EmbedderKind::Ollama => Box::new(OllamaEmbedder::new(
                &self.ollama_url,
                &self.embedding_model,
                self.embedding_dimensions,
                Duration::from_secs(self.embedding_timeout_secs.max(1)),
            )?),
        };
        Ok(embedder)
    }

    fn build_store(&self) -> anyhow::Result<Box<dyn VectorStore + Send + Sync>> {
        let store: Box<dyn VectorStore + Send + Sync> = match self.store {
            StoreKind::Memory => Box::new(
                MemoryVectorStore::open(&self.store_path)
                    .with_context(|| format!("failed to open {}", self.store_path.display()))?,
            ),
            StoreKind::Chroma => Box::new(ChromaStore::new(&self.chroma_url, &self.collection)?),
        };
        Ok(store)
    }

    fn build_context(&self) -> anyhow::Result<AppContext> {
        let generator = OllamaGenerator::new(
            &self.ollama_url,
            &self.ollama_model,
            Duration::from_secs(self.generation_timeout_secs.max(1)),
        )?;

        RagContext::new(
            self.rag_settings(),
            self.build_embedder()?,
            self.build_store()?,
            generator,
        )
        .context("invalid pipeline configuration")
    }
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}

async fn ingest(context: &AppContext, pdf_dir: &Path) -> anyhow::Result<IngestionReport> {
    let report = context.ingest(pdf_dir).await.map_err(|error| {
        error!(error = %error, "error occurred during processing");
        anyhow::anyhow!(error.to_string())
    })?;

    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for folder={}",
            report.skipped_files.len(),
            pdf_dir.display()
        );
    }

    Ok(report)
}

async fn chat(context: &AppContext) -> anyhow::Result<()> {
    info!("ready to answer questions");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYour question (or type 'exit'): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        if line.trim().eq_ignore_ascii_case("exit") {
            println!("Exiting.");
            break;
        }

        if line.trim().is_empty() {
            println!("{PROMPT_FOR_INPUT}");
            continue;
        }

        let answer = context.answer(&line).await.map_err(|error| {
            error!(error = %error, "error during question answering");
            anyhow::anyhow!(error.to_string())
        })?;
        println!("\nResponse:\n{answer}");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let cli = Cli::parse();

    init_logging(cli.log_file.as_deref())?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    let context = cli.build_context()?;
    let settings = context.settings();
    info!(
        artifact_dir = %settings.artifact_dir.display(),
        chunk_size = settings.chunk_size,
        chunk_overlap = settings.chunk_overlap,
        top_k = settings.top_k,
        "pipeline configured"
    );
    let report = ingest(&context, &cli.pdf_dir).await?;

    match cli.command {
        Command::Ingest => {
            println!(
                "{} pages segmented, {} chunks, {} records added{} at {}",
                report.pages_written,
                report.chunk_count,
                report.index.added,
                if report.index.already_populated {
                    " (store already populated)"
                } else {
                    ""
                },
                report.completed_at.to_rfc3339()
            );
            for skipped in &report.skipped_files {
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }
        }
        Command::Ask { question } => {
            if question.trim().is_empty() {
                println!("{PROMPT_FOR_INPUT}");
            } else {
                let answer = context
                    .answer(&question)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                println!("{answer}");
            }
        }
        Command::Chat => chat(&context).await?,
        Command::Serve { bind } => server::serve(Arc::new(context), &bind).await?,
    }

    Ok(())
}
