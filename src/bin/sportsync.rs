#![forbid(unsafe_code)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sportsync_engine::answers::{Answers, Lang};
use sportsync_engine::cache::SqliteResultCache;
use sportsync_engine::catalog::Catalog;
use sportsync_engine::config::EngineConfig;
use sportsync_engine::engine::{RecommendOutcome, RecommendRequest, RecommendationEngine};
use sportsync_engine::telemetry::{JsonlTelemetrySink, TracingTelemetry};

#[derive(Parser)]
#[command(name = "sportsync", version, about = "Sport identity recommendations from questionnaire answers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend cards for a set of answers
    Recommend {
        /// Answers JSON file (`-` reads stdin)
        #[arg(long)]
        answers: PathBuf,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Questionnaire with explicit option scores
        #[arg(long)]
        questions: Option<PathBuf>,
        /// Engine config (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        user_id: Option<String>,
        /// SQLite result cache
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Append telemetry events to this JSONL file
        #[arg(long)]
        telemetry: Option<PathBuf>,
        /// OpenRouter model id; generation also needs OPENROUTER_API_KEY
        #[arg(long)]
        model: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the full catalog ranking as JSON
    Rank {
        #[arg(long)]
        answers: PathBuf,
        #[arg(long)]
        catalog: Option<PathBuf>,
        #[arg(long, default_value = "en")]
        lang: String,
    },
    /// Load and validate catalog files
    ValidateCatalog {
        /// Path or glob pattern, e.g. `catalogs/*.json`
        #[arg(long)]
        catalog: String,
    },
    /// Export SQLite result cache to JSONL
    CacheExport {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Prune SQLite result cache (by age and/or size)
    CachePrune {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        max_age_days: Option<u64>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sportsync_engine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_answers(path: &Path) -> Result<Answers, Box<dyn std::error::Error>> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Recommend {
            answers,
            lang,
            catalog,
            questions,
            config,
            user_id,
            cache,
            telemetry,
            model,
            json,
        } => {
            let answers = read_answers(&answers)?;
            let lang = Lang::parse(&lang);

            let mut config = match config {
                Some(path) => EngineConfig::from_path(path)?,
                None => EngineConfig::default(),
            }
            .apply_env()?;
            if catalog.is_some() {
                config.catalog_path = catalog;
            }
            if questions.is_some() {
                config.questions_path = questions;
            }
            if cache.is_some() {
                config.cache.path = cache;
            }
            if model.is_some() {
                config.generation.model = model;
            }

            let mut engine = RecommendationEngine::from_config(config)?;
            let mut worker = None;
            match telemetry {
                Some(path) => {
                    let (sink, handle) = JsonlTelemetrySink::new(path)?;
                    engine = engine.with_telemetry(Arc::new(sink));
                    worker = Some(handle);
                }
                None => engine = engine.with_telemetry(Arc::new(TracingTelemetry)),
            }

            let request = RecommendRequest {
                answers,
                lang,
                user_id,
            };
            let outcome = engine.recommend(request).await?;
            // The telemetry writer drains once the engine drops its sink.
            drop(engine);
            if let Some(worker) = worker {
                worker.join()?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }
            match outcome {
                RecommendOutcome::Recommendations(set) => println!("{}", set.rendered),
                RecommendOutcome::InsufficientEvidence {
                    reason,
                    follow_up_questions,
                } => {
                    println!("insufficient evidence: {reason}");
                    for question in follow_up_questions {
                        println!("- {question}");
                    }
                }
            }
        }
        Commands::Rank {
            answers,
            catalog,
            lang,
        } => {
            let answers = read_answers(&answers)?;
            let catalog = match catalog {
                Some(path) => Catalog::load(path)?,
                None => Catalog::builtin()?,
            };
            let engine = RecommendationEngine::new(catalog, EngineConfig::default())?;
            let ranked = engine.rank(&answers, Lang::parse(&lang));
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
        Commands::ValidateCatalog { catalog } => {
            let paths = glob::glob(&catalog)?.collect::<Result<Vec<_>, _>>()?;
            if paths.is_empty() {
                return Err(format!("no catalog files match {catalog}").into());
            }
            for path in paths {
                let loaded = Catalog::load(&path)?;
                println!(
                    "ok: {} (version {}, {} items, {} guards)",
                    path.display(),
                    loaded.version(),
                    loaded.len(),
                    loaded.guards().len()
                );
            }
        }
        Commands::CacheExport { db, out } => {
            let path = db.unwrap_or_else(SqliteResultCache::default_path);
            let cache = SqliteResultCache::new(path)?;
            let rows = cache.export_jsonl(&out).await?;
            println!("exported {rows} rows to {}", out.display());
        }
        Commands::CachePrune {
            db,
            max_age_days,
            max_rows,
        } => {
            if max_age_days.is_none() && max_rows.is_none() {
                return Err("cache-prune requires --max-age-days and/or --max-rows".into());
            }
            if matches!(max_rows, Some(0)) {
                return Err("--max-rows must be >= 1".into());
            }
            let path = db.unwrap_or_else(SqliteResultCache::default_path);
            let cache = SqliteResultCache::new(path)?;
            let _lock = cache.lock_exclusive()?;
            let stats = cache.prune(max_age_days, max_rows).await?;
            println!("pruned {} rows; {} rows remain", stats.deleted, stats.remaining);
        }
    }

    Ok(())
}
