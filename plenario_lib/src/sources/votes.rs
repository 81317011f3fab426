//! Roll-call vote collection: live API first, yearly bulk JSON archive as
//! fallback when the API is down or incomplete.

use std::sync::Arc;

use serde_json::json;

use plenario_api::types::Vote;

use crate::cache::{object_path, ObjectStore};
use crate::config::VoteConfig;
use crate::error::PipelineError;
use crate::fetch::{RateLimitedFetcher, Upstream};
use crate::paginate::{paginate, PaginateOptions};
use crate::shutdown::CancelFlag;

use super::{BoxFuture, CollectOutcome, Provenance, RecordSource, SourceRecord};

fn vote_payload(vote: &Vote) -> serde_json::Value {
    json!({
        "external_id": vote.id,
        "date": vote.data,
        "registered_at": vote.data_hora_registro,
        "organ": vote.sigla_orgao,
        "description": vote.descricao,
        "approved": vote.aprovacao,
    })
}

/// Paginated `/votacoes` pull for one year.
pub struct ApiVoteSource {
    fetcher: Arc<RateLimitedFetcher>,
    cfg: VoteConfig,
}

impl ApiVoteSource {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, cfg: VoteConfig) -> Self {
        Self { fetcher, cfg }
    }
}

impl RecordSource for ApiVoteSource {
    fn name(&self) -> &str {
        "camara-api/votacoes"
    }

    fn collect<'a>(
        &'a self,
        year: i32,
        cancel: &'a CancelFlag,
    ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>> {
        Box::pin(async move {
            let mut params = vec![
                ("dataInicio".to_string(), format!("{}-01-01", year)),
                ("dataFim".to_string(), format!("{}-12-31", year)),
            ];
            for organ in &self.cfg.organs {
                params.push(("siglaOrgao".to_string(), organ.clone()));
            }

            let opts = PaginateOptions {
                max_pages: None,
                max_items: self.cfg.max_items,
                page_size: self.cfg.page_size,
            };
            let collection = paginate(
                &self.fetcher,
                Upstream::Camara,
                "/votacoes",
                &params,
                &opts,
                cancel,
            )
            .await;

            if collection.items.is_empty() {
                if let Some(e) = collection.error {
                    return Err(e);
                }
                return Ok(CollectOutcome::default());
            }

            let mut outcome = CollectOutcome::default();
            if collection.error.is_some() {
                outcome.errors += 1;
            }

            for item in collection.items {
                match serde_json::from_value::<Vote>(item) {
                    Ok(vote) => outcome.records.push(SourceRecord {
                        payload: vote_payload(&vote),
                        provenance: Provenance::now(self.name(), "/votacoes"),
                    }),
                    Err(e) => {
                        tracing::warn!("skipping malformed vote record: {}", e);
                        outcome.errors += 1;
                    }
                }
            }
            Ok(outcome)
        })
    }
}

/// Yearly bulk JSON dump (`/arquivos/votacoes/json/votacoes-{year}.json`).
pub struct JsonArchiveVoteSource {
    fetcher: Arc<RateLimitedFetcher>,
    cfg: VoteConfig,
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl JsonArchiveVoteSource {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        cfg: VoteConfig,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        Self {
            fetcher,
            cfg,
            object_store,
        }
    }
}

impl RecordSource for JsonArchiveVoteSource {
    fn name(&self) -> &str {
        "camara-archive/votacoes-json"
    }

    fn collect<'a>(
        &'a self,
        year: i32,
        cancel: &'a CancelFlag,
    ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>> {
        Box::pin(async move {
            let url = format!(
                "{}/votacoes/json/votacoes-{}.json",
                self.cfg.archive_base_url, year
            );
            let bytes = self.fetcher.fetch_bytes(&url, true).await?;

            if let Some(store) = &self.object_store {
                let path = object_path("votes", year, "bulk", "votacoes.json");
                if let Err(e) = store.put(&path, &bytes, "application/json", true) {
                    tracing::warn!("object store mirror failed for {}: {}", path, e);
                }
            }

            let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                PipelineError::MalformedSourceData(format!("vote archive is not JSON: {}", e))
            })?;
            let items = body
                .get("dados")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default();

            let mut outcome = CollectOutcome::default();
            for item in items {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                if let Some(max) = self.cfg.max_items {
                    if outcome.records.len() >= max {
                        break;
                    }
                }
                match serde_json::from_value::<Vote>(item) {
                    Ok(vote) => outcome.records.push(SourceRecord {
                        payload: vote_payload(&vote),
                        provenance: Provenance::now(self.name(), &url),
                    }),
                    Err(e) => {
                        tracing::warn!("skipping malformed archived vote: {}", e);
                        outcome.errors += 1;
                    }
                }
            }
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::cache::DiskCache;
    use crate::config::FetchConfig;
    use plenario_api::CamaraClient;

    fn fetcher(uri: &str, dir: &tempfile::TempDir) -> Arc<RateLimitedFetcher> {
        let cache = Arc::new(DiskCache::open(dir.path(), Duration::from_secs(60)).unwrap());
        Arc::new(RateLimitedFetcher::new(
            CamaraClient::with_base_url(uri),
            None,
            cache,
            FetchConfig {
                min_interval_ms: 0,
                max_retries: 0,
                ..FetchConfig::default()
            },
            CancelFlag::new(),
        ))
    }

    #[tokio::test]
    async fn archive_fallback_parses_dump() {
        let server = MockServer::start().await;
        let dump = serde_json::json!({
            "dados": [
                {"id": "2265603-43", "data": "2024-05-01", "siglaOrgao": "PLEN", "aprovacao": 1},
                {"id": "2265603-44", "data": "2024-05-02", "siglaOrgao": "PLEN", "aprovacao": 0}
            ]
        })
        .to_string();
        Mock::given(method("GET"))
            .and(path("/votacoes/json/votacoes-2024.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(dump))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = VoteConfig {
            archive_base_url: server.uri(),
            ..VoteConfig::default()
        };
        let source = JsonArchiveVoteSource::new(fetcher(&server.uri(), &dir), cfg, None);
        let outcome = source.collect(2024, &CancelFlag::new()).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].payload["external_id"], "2265603-43");
        assert_eq!(outcome.records[1].payload["approved"], 0);
    }

    #[tokio::test]
    async fn archive_item_ceiling_applies() {
        let server = MockServer::start().await;
        let dados: Vec<serde_json::Value> = (0..10)
            .map(|i| serde_json::json!({"id": format!("v-{}", i)}))
            .collect();
        let dump = serde_json::json!({"dados": dados}).to_string();
        Mock::given(method("GET"))
            .and(path("/votacoes/json/votacoes-2024.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(dump))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = VoteConfig {
            archive_base_url: server.uri(),
            max_items: Some(3),
            ..VoteConfig::default()
        };
        let source = JsonArchiveVoteSource::new(fetcher(&server.uri(), &dir), cfg, None);
        let outcome = source.collect(2024, &CancelFlag::new()).await.unwrap();
        assert_eq!(outcome.records.len(), 3);
    }
}
