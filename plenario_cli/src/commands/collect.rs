//! The `collect` subcommand: run the reconciliation pipeline for one or
//! all targets of a year.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use plenario_lib::plenario_api::{CamaraClient, TransparenciaClient};
use plenario_lib::sources::amendments::{CsvDownloadSource, TransparenciaApiSource};
use plenario_lib::sources::expenses::ApiExpenseSource;
use plenario_lib::sources::legislators::ApiLegislatorSource;
use plenario_lib::sources::propositions::JsonDumpPropositionSource;
use plenario_lib::sources::votes::{ApiVoteSource, JsonArchiveVoteSource};
use plenario_lib::{
    resolver_from_store, CancelFlag, CollectionResult, DiskCache, LocalObjectStore, ObjectStore,
    Orchestrator, PaginateOptions, PipelineConfig, RateLimitedFetcher, RecordSource, SqliteStore,
    Store, TargetSpec,
};

use crate::output::{print_json, print_results_table, OutputFormat};

/// Which pipeline to run.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Legislators,
    Amendments,
    Expenses,
    Votes,
    Propositions,
    All,
}

#[derive(Args)]
pub struct CollectArgs {
    /// Collection target
    #[arg(value_enum)]
    pub target: Target,

    /// Budget year to collect (defaults to the current year)
    #[arg(long)]
    pub year: Option<i32>,

    /// SQLite database path
    #[arg(long, default_value = "plenario.db")]
    pub db: PathBuf,

    /// Pipeline configuration file (TOML); defaults apply when absent
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Response cache directory (overrides the config file)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Mirror bulk downloads into this directory (object-store layout)
    #[arg(long)]
    pub mirror_dir: Option<PathBuf>,

    /// Worker pool size for partitioned targets (overrides the config file)
    #[arg(long)]
    pub workers: Option<usize>,
}

pub async fn run(args: &CollectArgs, format: &OutputFormat) -> Result<()> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    cfg.fetch = cfg.fetch.with_env_overrides();
    if let Some(dir) = &args.cache_dir {
        cfg.cache.dir = dir.display().to_string();
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }

    let year = args
        .year
        .unwrap_or_else(|| chrono::Utc::now().date_naive().year());

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("cancellation requested, finishing in-flight work...");
                cancel.cancel();
            }
        });
    }

    let cache = Arc::new(DiskCache::open(&cfg.cache.dir, cfg.cache.default_ttl())?);
    let transparencia_key = std::env::var("CHAVE_API_DADOS").ok();
    let has_transparencia_key = transparencia_key.is_some();
    if !has_transparencia_key {
        eprintln!("CHAVE_API_DADOS not set; Transparência API sources are disabled");
    }
    let fetcher = Arc::new(RateLimitedFetcher::new(
        CamaraClient::new(),
        transparencia_key.map(TransparenciaClient::new),
        cache,
        cfg.fetch.clone(),
        cancel.clone(),
    ));

    let mirror: Option<Arc<dyn ObjectStore>> = args
        .mirror_dir
        .as_ref()
        .map(|dir| Arc::new(LocalObjectStore::new(dir)) as Arc<dyn ObjectStore>);

    let store = Arc::new(SqliteStore::open(&args.db)?);
    store.init()?;

    let targets: Vec<Target> = match args.target {
        Target::All => vec![
            Target::Legislators,
            Target::Amendments,
            Target::Expenses,
            Target::Votes,
            Target::Propositions,
        ],
        single => vec![single],
    };

    let mut results: Vec<CollectionResult> = Vec::new();
    let mut hard_failures: Vec<String> = Vec::new();

    for target in targets {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = run_one(
            target,
            year,
            &cfg,
            &fetcher,
            store.clone(),
            &cancel,
            mirror.clone(),
            has_transparencia_key,
        )
        .await;
        match outcome {
            Ok(result) => {
                eprintln!(
                    "{}: {} found, {} saved, {} errors via {}",
                    result.target,
                    result.found,
                    result.saved,
                    result.errors,
                    result.source_used.as_deref().unwrap_or("-")
                );
                results.push(result);
            }
            Err(e) => {
                eprintln!("{} failed: {}", target_name(target), e);
                hard_failures.push(format!("{}: {}", target_name(target), e));
            }
        }
    }

    let summary = fetcher.tracker().summary();
    eprintln!(
        "requests: {} made, {} rate limited, {} failed, {} cache hits, {:.1}s backing off",
        summary.requests_made,
        summary.requests_rate_limited,
        summary.requests_failed,
        summary.cache_hits,
        summary.total_backoff_secs
    );

    match format {
        OutputFormat::Table => print_results_table(&results),
        OutputFormat::Json => print_json(&results),
    }

    if !hard_failures.is_empty() {
        anyhow::bail!("targets failed: {}", hard_failures.join("; "));
    }
    Ok(())
}

fn target_name(target: Target) -> &'static str {
    match target {
        Target::Legislators => "legislators",
        Target::Amendments => "amendments",
        Target::Expenses => "expenses",
        Target::Votes => "votes",
        Target::Propositions => "propositions",
        Target::All => "all",
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one(
    target: Target,
    year: i32,
    cfg: &PipelineConfig,
    fetcher: &Arc<RateLimitedFetcher>,
    store: Arc<SqliteStore>,
    cancel: &CancelFlag,
    mirror: Option<Arc<dyn ObjectStore>>,
    has_transparencia_key: bool,
) -> Result<CollectionResult, anyhow::Error> {
    match target {
        Target::Legislators => {
            let orchestrator = Orchestrator::new(store, None, cancel.clone(), cfg.workers);
            let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(ApiLegislatorSource::new(
                fetcher.clone(),
                PaginateOptions::default(),
            ))];
            Ok(orchestrator
                .run_target(&TargetSpec::LEGISLATORS, year, &sources)
                .await?)
        }
        Target::Amendments => {
            let resolver = resolver_from_store(store.as_ref(), &cfg.resolver)?;
            let orchestrator = Orchestrator::new(
                store,
                Some(Arc::new(resolver)),
                cancel.clone(),
                cfg.workers,
            );
            let mut sources: Vec<Box<dyn RecordSource>> = vec![Box::new(CsvDownloadSource::new(
                fetcher.clone(),
                cfg.amendments.clone(),
                mirror,
            ))];
            if has_transparencia_key {
                sources.push(Box::new(TransparenciaApiSource::new(
                    fetcher.clone(),
                    cfg.amendments.clone(),
                )));
            }
            Ok(orchestrator
                .run_target(&TargetSpec::AMENDMENTS, year, &sources)
                .await?)
        }
        Target::Expenses => {
            let legislators = store.legislators()?;
            if legislators.is_empty() {
                anyhow::bail!("no legislators stored; run `plenario collect legislators` first");
            }
            let api_ids: HashMap<i64, i64> = legislators
                .iter()
                .filter_map(|l| l.external_id.parse::<i64>().ok().map(|api| (l.id, api)))
                .collect();
            let partitions: Vec<i64> = api_ids.keys().copied().collect();

            let bar = ProgressBar::new(partitions.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{msg} {bar:30} {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message("expenses");

            let orchestrator = Orchestrator::new(store, None, cancel.clone(), cfg.workers);
            let fetcher = fetcher.clone();
            let expense_cfg = cfg.expenses.clone();
            let bar_for_sources = bar.clone();
            let make_sources: Arc<dyn Fn(i64) -> Vec<Box<dyn RecordSource>> + Send + Sync> =
                Arc::new(move |entity_id| {
                    bar_for_sources.inc(1);
                    let api_id = api_ids.get(&entity_id).copied().unwrap_or(entity_id);
                    vec![Box::new(ApiExpenseSource::new(
                        fetcher.clone(),
                        api_id,
                        entity_id,
                        expense_cfg.clone(),
                    )) as Box<dyn RecordSource>]
                });

            let result = orchestrator
                .run_partitioned(&TargetSpec::EXPENSES, year, partitions, make_sources)
                .await?;
            bar.finish_and_clear();
            Ok(result)
        }
        Target::Votes => {
            let orchestrator = Orchestrator::new(store, None, cancel.clone(), cfg.workers);
            let sources: Vec<Box<dyn RecordSource>> = vec![
                Box::new(ApiVoteSource::new(fetcher.clone(), cfg.votes.clone())),
                Box::new(JsonArchiveVoteSource::new(
                    fetcher.clone(),
                    cfg.votes.clone(),
                    mirror,
                )),
            ];
            Ok(orchestrator
                .run_target(&TargetSpec::VOTES, year, &sources)
                .await?)
        }
        Target::Propositions => {
            let orchestrator = Orchestrator::new(store, None, cancel.clone(), cfg.workers);
            let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(
                JsonDumpPropositionSource::new(fetcher.clone(), cfg.propositions.clone(), None),
            )];
            Ok(orchestrator
                .run_target(&TargetSpec::PROPOSITIONS, year, &sources)
                .await?)
        }
        Target::All => unreachable!("expanded by the caller"),
    }
}
