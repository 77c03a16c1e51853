use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use dispute_agent::config::{check_endpoint, AgentConfig, IndexBackend};
use dispute_agent::generation::OllamaGenerator;
use dispute_agent::ingestion::{ingest_policies, ChunkOptions};
use dispute_agent::pipeline::{ChatRequest, DisputePipeline, PipelineOutput};
use dispute_agent::retrieval::{
    DocumentIndex, Embedder, HttpDocumentIndex, HttpEmbedder, HttpReranker, MemoryIndex, Retriever,
};
use triage::TriageConfig;

#[derive(Parser)]
#[command(name = "dispute-agent", about = "Airline dispute assistant pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one question through the pipeline and print the response JSON.
    Ask {
        message: String,
        /// Stream the generated answer to stderr as it is produced.
        #[arg(long)]
        stream: bool,
    },
    /// Ingest policy .txt files into the document index.
    Ingest {
        #[arg(default_value = "data/policies")]
        dir: PathBuf,
    },
    /// Check collaborator endpoint reachability.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let agent_config = AgentConfig::default();
    let triage_config = load_triage_config().context("invalid triage configuration")?;

    match cli.command {
        Command::Ask { message, stream } => ask(agent_config, triage_config, message, stream).await,
        Command::Ingest { dir } => ingest(agent_config, dir).await,
        Command::Health => health(agent_config).await,
    }
}

/// Triage config resolution: defaults, then the optional `TRIAGE_CONFIG`
/// TOML file (thresholds, required-slot table, rule table), then the
/// numeric environment overrides.
fn load_triage_config() -> Result<TriageConfig> {
    let Ok(path) = std::env::var("TRIAGE_CONFIG") else {
        return Ok(TriageConfig::from_env()?);
    };
    let raw =
        std::fs::read_to_string(&path).with_context(|| format!("reading triage config {path}"))?;
    info!(path = %path, "loaded triage config file");
    let mut config = TriageConfig::from_toml_str(&raw)?;
    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

fn build_index(config: &AgentConfig, client: &reqwest::Client) -> Result<Arc<dyn DocumentIndex>> {
    Ok(match &config.index {
        IndexBackend::Http { url, collection } => {
            info!(url = %url, collection = %collection, "using HTTP document index");
            Arc::new(HttpDocumentIndex::new(client.clone(), url, collection))
        }
        IndexBackend::Snapshot { path } => {
            info!(path = %path.display(), "using snapshot document index");
            Arc::new(MemoryIndex::load(path).context("loading index snapshot")?)
        }
    })
}

fn build_pipeline(
    agent_config: &AgentConfig,
    triage_config: &TriageConfig,
) -> Result<DisputePipeline> {
    let client = reqwest::Client::new();
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
        client.clone(),
        &agent_config.embedding.url,
        &agent_config.embedding.model,
    ));
    let index = build_index(agent_config, &client)?;
    let reranker = Arc::new(HttpReranker::new(client.clone(), &agent_config.reranker.url));
    let retriever = Retriever::new(
        embedder,
        index,
        reranker,
        triage_config.top_k,
        triage_config.filter_retry_threshold,
    );
    let generator = Arc::new(OllamaGenerator::new(
        client,
        &agent_config.generation.url,
        &agent_config.generation.model,
    ));

    Ok(DisputePipeline::new(
        triage_config,
        retriever,
        generator,
        agent_config.generation_timeout,
        agent_config.num_predict,
        agent_config.temperature,
    ))
}

async fn ask(
    agent_config: AgentConfig,
    triage_config: TriageConfig,
    message: String,
    stream: bool,
) -> Result<()> {
    let pipeline = build_pipeline(&agent_config, &triage_config)?;
    pipeline.warmup().await;

    let request = ChatRequest::new(message);

    if stream {
        match pipeline.handle_stream(&request).await {
            PipelineOutput::Full(payload) => {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
            PipelineOutput::Streaming {
                mut head,
                mut tokens,
                ..
            } => {
                let mut answer = String::new();
                while let Some(chunk) = tokens.recv().await {
                    let chunk = chunk.context("generation stream failed")?;
                    eprint!("{chunk}");
                    answer.push_str(&chunk);
                }
                eprintln!();
                head.answer = Some(answer);
                println!("{}", serde_json::to_string_pretty(&head)?);
            }
        }
    } else {
        let payload = pipeline.handle(&request).await;
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

async fn ingest(agent_config: AgentConfig, dir: PathBuf) -> Result<()> {
    let client = reqwest::Client::new();
    let embedder = HttpEmbedder::new(
        client.clone(),
        &agent_config.embedding.url,
        &agent_config.embedding.model,
    );

    match &agent_config.index {
        IndexBackend::Http { url, collection } => {
            let index = HttpDocumentIndex::new(client, url, collection);
            let report = ingest_policies(&dir, &embedder, &index, ChunkOptions::default())
                .await
                .context("ingestion failed")?;
            info!(files = report.files, chunks = report.chunks, "ingested into HTTP index");
        }
        IndexBackend::Snapshot { path } => {
            let index = MemoryIndex::load(path).context("loading index snapshot")?;
            let report = ingest_policies(&dir, &embedder, &index, ChunkOptions::default())
                .await
                .context("ingestion failed")?;
            index.save(path).context("saving index snapshot")?;
            info!(
                files = report.files,
                chunks = report.chunks,
                path = %path.display(),
                "ingested into snapshot index"
            );
        }
    }
    Ok(())
}

async fn health(config: AgentConfig) -> Result<()> {
    let embedding_ok = check_endpoint(&config.embedding.url).await;
    println!("embedding   {}  {}", status(embedding_ok), config.embedding.url);

    let reranker_ok = check_endpoint(&config.reranker.url).await;
    println!("reranker    {}  {}", status(reranker_ok), config.reranker.url);

    let generation_ok = check_endpoint(&format!("{}/api", config.generation.url)).await;
    println!("generation  {}  {}", status(generation_ok), config.generation.url);

    match &config.index {
        IndexBackend::Http { url, .. } => {
            let ok = check_endpoint(url).await;
            println!("index       {}  {url}", status(ok));
        }
        IndexBackend::Snapshot { path } => {
            let ok = path.exists();
            println!("index       {}  {}", status(ok), path.display());
        }
    }
    Ok(())
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok  "
    } else {
        "down"
    }
}
