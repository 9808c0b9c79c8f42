use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use diagnosys_core::config::{Config, ResponseMode};
use diagnosys_core::evaluation::Recorder;
use diagnosys_core::{create_provider, AnswerPipeline, IndexCache, NormalizedChat, QueryEngine, Server};
use futures::StreamExt;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diagnosys")]
#[command(about = "Retrieval-augmented clinical question answering", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP server")]
    Serve,

    #[command(about = "Build the index, or load it if already persisted")]
    Index,

    #[command(about = "Ask a question directly against the index")]
    Query {
        #[arg(help = "Question text")]
        text: String,

        #[arg(short, long, help = "Score the answer and append an evaluation record")]
        evaluate: bool,
    },

    #[command(about = "Send a question to a running server")]
    Ask {
        #[arg(help = "Question text")]
        text: String,

        #[arg(short, long, default_value = "http://localhost:8000/api/chat")]
        url: String,
    },

    #[command(about = "Show current configuration")]
    Show,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => runtime()?.block_on(serve(&cli.config)),
        Commands::Index => runtime()?.block_on(build_index(&cli.config)),
        Commands::Query { text, evaluate } => runtime()?.block_on(query(&cli.config, &text, evaluate)),
        Commands::Ask { text, url } => ask(&url, &text),
        Commands::Show => show_config(&cli.config),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start async runtime")
}

fn load_config(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        Config::load(config_path).context("Failed to load config")
    } else {
        tracing::info!("{} not found, using defaults", config_path.display());
        Ok(Config::default())
    }
}

async fn serve(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let server = Server::new(config).await.context("Failed to initialize server")?;
    server.start().await.context("Server error")?;
    Ok(())
}

async fn build_index(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let provider = create_provider(&config).context("Failed to create provider")?;

    let started = Instant::now();
    let index = IndexCache::new(provider, config.rag.clone())
        .obtain(&config.storage.storage_dir, &config.storage.data_dir)
        .await
        .context("Failed to obtain index")?;
    let manifest = index.manifest();

    println!("{} Index ready in {:.2?}", "✓".green().bold(), started.elapsed());
    println!();
    println!("  Location:        {}", config.storage.storage_dir.display());
    println!("  Documents:       {}", manifest.document_count);
    println!("  Passages:        {}", manifest.passage_count);
    println!("  Embedding Model: {}", manifest.embedding_model.cyan());
    println!("  Dimension:       {}", manifest.dimension);
    println!("  Created:         {}", manifest.created_at.to_rfc3339());

    Ok(())
}

async fn query(config_path: &Path, text: &str, evaluate: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let provider = create_provider(&config).context("Failed to create provider")?;

    let index = IndexCache::new(Arc::clone(&provider), config.rag.clone())
        .obtain(&config.storage.storage_dir, &config.storage.data_dir)
        .await
        .context("Failed to obtain index")?;
    let engine = QueryEngine::new(index, Arc::clone(&provider), &config);

    let mut pipeline = AnswerPipeline::new(engine, &config.server);
    if evaluate {
        pipeline = pipeline
            .with_mode(ResponseMode::EvaluatedSync)
            .with_recorder(Recorder::from_config(provider, &config));
    } else {
        pipeline = pipeline.with_mode(ResponseMode::Streaming);
    }

    let started = Instant::now();
    let body = pipeline
        .start(NormalizedChat::new(text))
        .await
        .context("Query failed")?;

    let mut chunks = body.into_stream();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.context("Answer stream failed")?;
        write!(stdout, "{}", chunk)?;
        stdout.flush()?;
    }
    println!();

    if let Some(recorder) = pipeline.recorder() {
        println!("{} Scoring answer...", "→".blue());
        recorder.flush().await;
        println!(
            "{} Evaluation appended to {}",
            "✓".green().bold(),
            config.evaluation.records_path.display()
        );
    }

    println!("{}", format!("Response time: {:.2?}", started.elapsed()).dimmed());
    Ok(())
}

fn ask(url: &str, text: &str) -> Result<()> {
    use reqwest::blocking::Client;
    use serde_json::json;

    let body = json!({"messages": [{"role": "user", "content": text}]});

    println!("{} Calling: {}", "→".blue(), url);
    let started = Instant::now();

    let response = Client::builder()
        .timeout(None)
        .build()
        .context("Failed to build HTTP client")?
        .post(url)
        .json(&body)
        .send()
        .context("Failed to connect to server. Is it running?")?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response
            .json::<serde_json::Value>()
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_default();
        anyhow::bail!("Server returned {}: {}", status, detail);
    }

    for line in BufReader::new(response).lines() {
        let line = line.context("Failed to read response stream")?;
        if !line.is_empty() {
            println!("{}", line);
        }
    }

    println!("Response time: {:.2?}", started.elapsed());
    Ok(())
}

fn show_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Provider:        {:?}", config.llm.provider);
    println!("  Model:           {}", config.llm.model.cyan());
    println!("  Base URL:        {}", config.llm.base_url);
    println!("  Temperature:     {}", config.llm.temperature);
    println!("  API Key Env:     {}", config.llm.api_key_env);
    println!();
    println!("{}", "RAG:".bold());
    println!("  Embedding Model: {}", config.rag.embedding_model.cyan());
    println!("  Chunk Size:      {}", config.rag.chunk_size);
    println!("  Chunk Overlap:   {}", config.rag.chunk_overlap);
    println!("  Top K:           {}", config.rag.top_k);
    println!();
    println!("{}", "Storage:".bold());
    println!("  Index:           {}", config.storage.storage_dir.display());
    println!("  Documents:       {}", config.storage.data_dir.display());
    println!();
    println!("{}", "Server:".bold());
    println!("  Address:         {}", config.server.bind_addr());
    println!("  Response Mode:   {:?}", config.server.response_mode);
    println!("  Use History:     {}", config.server.use_history);
    println!();
    println!("{}", "Evaluation:".bold());
    println!("  Enabled:         {}", config.evaluation.enabled);
    println!("  App ID:          {}", config.evaluation.app_id);
    println!("  Records:         {}", config.evaluation.records_path.display());
    println!("  Judge Model:     {}", config.evaluation_model().cyan());

    Ok(())
}
