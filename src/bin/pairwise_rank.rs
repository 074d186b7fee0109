#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pairwise_rankings::gateway::{ChatJudge, DEFAULT_MODEL};
use pairwise_rankings::ranking::{
    participation_counts, rank_group_with_trace, validate_ranking_request, JsonlTraceSink,
    MemoryStore, PairScheduler, RankingRequest, TraceSink, TracingProgressSink,
};

#[derive(Parser)]
#[command(name = "pairwise-rank", version, about = "Pairwise LLM ranking CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank a candidate group from JSON input (LLM calls)
    Rank {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// JSONL file receiving one line per comparison
        #[arg(long)]
        trace: Option<PathBuf>,
        /// OpenRouter model ID used as judge
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Show the pair schedule for a request without calling a judge
    Plan {
        #[arg(long)]
        request: PathBuf,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Run synthetic evaluation suite
    Eval {
        #[arg(long)]
        case: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
}

/// Flags that override the request's `config` block.
#[derive(Args, Debug, Default)]
struct ConfigOverrides {
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    fn apply(&self, req: &mut RankingRequest) {
        if let Some(c) = self.concurrency {
            req.config.concurrency = c;
        }
        if let Some(seed) = self.seed {
            req.config.rng_seed = seed;
        }
        if let Some(r) = self.max_retries {
            req.config.max_retries = r;
        }
        if let Some(t) = self.timeout_secs {
            req.config.comparator_timeout_secs = t;
        }
    }
}

#[derive(serde::Serialize)]
struct PlanSummary {
    group: pairwise_rankings::GroupKey,
    candidates: usize,
    pairs: usize,
    min_participation: usize,
    max_participation: usize,
    participation: Vec<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rank {
            request,
            out,
            trace,
            model,
            overrides,
        } => {
            let mut req: RankingRequest = read_json(&request)?;
            overrides.apply(&mut req);
            validate_ranking_request(&req)?;

            let judge = Arc::new(ChatJudge::from_env(model)?);
            let store = MemoryStore::with_group(req.group, req.candidates.clone());

            let cancel = Arc::new(AtomicBool::new(false));
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupt received; finishing in-flight comparisons");
                        cancel.store(true, Ordering::Relaxed);
                    }
                });
            }

            let trace_sink = trace.map(JsonlTraceSink::create).transpose()?;
            let trace_ref = trace_sink.as_ref().map(|sink| sink as &dyn TraceSink);

            let result = rank_group_with_trace(
                judge,
                &store,
                &TracingProgressSink,
                req,
                trace_ref,
                Some(cancel.as_ref()),
            )
            .await;

            if let Some(sink) = trace_sink {
                sink.close()?;
            }

            let outcome = result?;
            write_json(&out, &outcome)?;
        }
        Commands::Plan { request, overrides } => {
            let mut req: RankingRequest = read_json(&request)?;
            overrides.apply(&mut req);
            validate_ranking_request(&req)?;

            let n = req.candidates.len();
            let pairs = PairScheduler::new(n, &req.config).schedule();
            let participation = participation_counts(n, &pairs);
            let summary = PlanSummary {
                group: req.group,
                candidates: n,
                pairs: pairs.len(),
                min_participation: participation.iter().copied().min().unwrap_or(0),
                max_participation: participation.iter().copied().max().unwrap_or(0),
                participation,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Eval { case, out } => {
            let results =
                pairwise_rankings::ranking::evaluation::run_synthetic_suite(case.as_deref())
                    .await?;
            let mut file = File::create(out)?;
            for result in &results {
                let line = serde_json::to_string(result)?;
                writeln!(file, "{line}")?;
            }
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
