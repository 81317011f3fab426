//! The `legislators` subcommand: list legislators straight from the API.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use plenario_lib::plenario_api::types::{ApiPage, Legislator};
use plenario_lib::plenario_api::CamaraClient;
use plenario_lib::{
    CacheConfig, CancelFlag, DiskCache, FetchConfig, RateLimitedFetcher, Upstream,
};

use crate::output::{print_json, print_legislators_table, OutputFormat};

#[derive(Args)]
pub struct LegislatorsArgs {
    /// Filter by (partial) name
    #[arg(long)]
    pub name: Option<String>,

    /// Filter by state code (e.g. RS, SP)
    #[arg(long)]
    pub state: Option<String>,

    /// Filter by party abbreviation (e.g. PT, PL)
    #[arg(long)]
    pub party: Option<String>,

    /// Page number
    #[arg(long, default_value = "1")]
    pub page: i64,

    /// Results per page
    #[arg(long, default_value = "20")]
    pub page_size: i64,

    /// Response cache directory
    #[arg(long, default_value = "cache")]
    pub cache_dir: String,
}

pub async fn run(args: &LegislatorsArgs, format: &OutputFormat) -> Result<()> {
    let cache_cfg = CacheConfig {
        dir: args.cache_dir.clone(),
        ..CacheConfig::default()
    };
    let cache = Arc::new(DiskCache::open(&cache_cfg.dir, cache_cfg.default_ttl())?);
    let fetcher = RateLimitedFetcher::new(
        CamaraClient::new(),
        None,
        cache,
        FetchConfig::default(),
        CancelFlag::new(),
    );

    let mut params: Vec<(String, String)> = vec![
        ("pagina".to_string(), args.page.to_string()),
        ("itens".to_string(), args.page_size.to_string()),
        ("ordem".to_string(), "ASC".to_string()),
        ("ordenarPor".to_string(), "nome".to_string()),
    ];
    if let Some(name) = &args.name {
        params.push(("nome".to_string(), name.clone()));
    }
    if let Some(state) = &args.state {
        params.push(("siglaUf".to_string(), state.to_uppercase()));
    }
    if let Some(party) = &args.party {
        params.push(("siglaPartido".to_string(), party.to_uppercase()));
    }

    let body = fetcher
        .fetch_json(Upstream::Camara, "/deputados", &params, true)
        .await?;
    let page: ApiPage<Legislator> = serde_json::from_value(body)?;

    eprintln!(
        "page {} ({} legislators{})",
        args.page,
        page.dados.len(),
        if page.next_link().is_some() {
            ", more available"
        } else {
            ""
        }
    );

    match format {
        OutputFormat::Table => print_legislators_table(&page.dados),
        OutputFormat::Json => print_json(&page.dados),
    }

    Ok(())
}
