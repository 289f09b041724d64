//! Debug tool: rank a JSON candidate pool against a query and print the
//! per-candidate score breakdown.
//!
//! The candidate file is a JSON array of candidate records:
//! `[{"id": "...", "table": "...", "title": "...", ...}, ...]`

use clap::Parser;
use prettytable::{row, Table};
use std::fs;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use sibyl::config::ConfigSnapshot;
use sibyl::pipeline::{QueryOutcome, QueryPipeline};
use sibyl::rank::types::CandidateRecord;

#[derive(Parser)]
#[command(about = "Rank a candidate pool against a free-text query")]
struct Args {
    /// The query to rank against
    query: String,

    /// Path to a JSON file holding the candidate pool
    candidates: String,

    /// Maximum number of results
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let data = fs::read_to_string(&args.candidates)?;
    let pool: Vec<CandidateRecord> = serde_json::from_str(&data)?;

    let config = Arc::new(ConfigSnapshot::from_env()?);
    let pipeline = QueryPipeline::new(config);

    match pipeline.run(&args.query, pool, args.limit).await {
        QueryOutcome::NoSignal { .. } => {
            println!("no signal: no entities extracted and the candidate pool is empty");
        }
        QueryOutcome::Results { extraction, ranked } => {
            println!(
                "entities: {}",
                extraction
                    .entities
                    .iter()
                    .map(|e| format!("{} ({})", e.text, e.entity_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!();

            let mut table = Table::new();
            table.add_row(row![
                "#", "id", "table", "tier", "tier pts", "conj", "prox", "conf", "intent",
                "recency", "noise", "total"
            ]);

            for (rank, result) in ranked.iter().enumerate() {
                let b = &result.breakdown;
                table.add_row(row![
                    rank + 1,
                    result.candidate.id,
                    result.candidate.table,
                    result.tier,
                    format!("{:.1}", b.match_tier),
                    format!("{:.1}", b.conjunction_bonus),
                    format!("{:.1}", b.proximity_bonus),
                    format!("{:.1}", b.entity_confidence),
                    format!("{:.1}", b.intent_prior),
                    format!("{:.1}", b.recency_bonus),
                    format!("{:.1}", b.noise_penalty),
                    format!("{:.1}", result.score()),
                ]);
            }
            table.printstd();
        }
    }

    Ok(())
}
