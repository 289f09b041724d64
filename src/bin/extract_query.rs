//! Debug tool: run the extraction pipeline on a query from the command line
//! and print the resulting entities and stage timings.
//!
//! Environment variables:
//! - `SIBYL_LLM_ENABLED`: set to "true" to enable the probabilistic stage
//! - `SIBYL_LLM_TYPE`: "ollama" (default) or "openai"
//! - `OLLAMA_HOST` / `OLLAMA_PORT`: Ollama endpoint (default localhost:11434)
//! - `OPENAI_API_KEY`: OpenAI API key (required if SIBYL_LLM_TYPE is "openai")

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use clap::Parser;
use colored::Colorize;
use ollama_rs::Ollama;
use std::env;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sibyl::config::ConfigSnapshot;
use sibyl::entity::probabilistic::LlmGapExtractor;
use sibyl::environment::get_env_parsed;
use sibyl::pipeline::QueryPipeline;
use sibyl::{LLMClient, LLMParams};

#[derive(Parser)]
#[command(about = "Extract typed entities from a free-text query")]
struct Args {
    /// The query to analyze
    query: String,

    /// Also print pre-merge candidates
    #[arg(long)]
    trace: bool,

    /// Full tracing output (stdout + rolling log file)
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        sibyl::logging::configure_logging();
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::WARN)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    let config = Arc::new(ConfigSnapshot::from_env()?);

    let mut pipeline = QueryPipeline::new(Arc::clone(&config)).with_premerge_trace(args.trace);

    if get_env_parsed("SIBYL_LLM_ENABLED", false) {
        let llm_client = match env::var("SIBYL_LLM_TYPE")
            .unwrap_or_else(|_| "ollama".to_string())
            .as_str()
        {
            "openai" => {
                let api_key = env::var("OPENAI_API_KEY")
                    .expect("OPENAI_API_KEY environment variable must be set");
                LLMClient::OpenAI(OpenAIClient::with_config(
                    OpenAIConfig::new().with_api_key(api_key),
                ))
            }
            _ => {
                let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port: u16 = get_env_parsed("OLLAMA_PORT", 11434);
                info!("Connecting to Ollama at {}:{}", host, port);
                LLMClient::Ollama(Ollama::new(host, port))
            }
        };

        let params = LLMParams {
            llm_client,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
        };
        pipeline = pipeline.with_gap_extractor(Arc::new(LlmGapExtractor::new(params)));
    }

    let result = pipeline.understand(&args.query).await;

    println!("{} {}", "normalized:".bold(), result.normalized_text);
    println!();

    if result.entities.is_empty() {
        println!("{}", "no entities found".yellow());
    }
    for entity in &result.entities {
        println!(
            "{:>14}  {}  {} {}",
            entity.entity_type.to_string().green(),
            entity.text.bold(),
            format!("({:.2}", entity.confidence).dimmed(),
            format!("via {}, {}..{})", entity.source, entity.span.start, entity.span.end)
                .dimmed(),
        );
    }

    if let Some(premerge) = &result.premerge {
        println!();
        println!("{}", "pre-merge candidates:".bold());
        for entity in premerge {
            println!(
                "{:>14}  {}  {}",
                entity.entity_type.to_string().blue(),
                entity.text,
                format!("({:.2} via {})", entity.confidence, entity.source).dimmed(),
            );
        }
    }

    println!();
    let t = &result.timings;
    println!(
        "{} normalize={:?} deterministic={:?} coverage={:?} probabilistic={:?} merge={:?} total={:?}",
        "timings:".bold(),
        t.normalize,
        t.deterministic,
        t.coverage,
        t.probabilistic,
        t.merge,
        t.total
    );

    Ok(())
}
