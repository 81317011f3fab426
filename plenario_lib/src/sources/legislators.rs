//! Legislator reference data from the Câmara API.
//!
//! Collected before everything else in a run: the stored legislators feed
//! the resolver index used to attribute amendments.

use std::sync::Arc;

use serde_json::json;

use plenario_api::types::Legislator;

use crate::error::PipelineError;
use crate::fetch::{RateLimitedFetcher, Upstream};
use crate::paginate::{paginate, PaginateOptions};
use crate::shutdown::CancelFlag;

use super::{BoxFuture, CollectOutcome, Provenance, RecordSource, SourceRecord};

pub struct ApiLegislatorSource {
    fetcher: Arc<RateLimitedFetcher>,
    opts: PaginateOptions,
}

impl ApiLegislatorSource {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, opts: PaginateOptions) -> Self {
        Self { fetcher, opts }
    }
}

impl RecordSource for ApiLegislatorSource {
    fn name(&self) -> &str {
        "camara-api/deputados"
    }

    fn collect<'a>(
        &'a self,
        _year: i32,
        cancel: &'a CancelFlag,
    ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>> {
        Box::pin(async move {
            let collection = paginate(
                &self.fetcher,
                Upstream::Camara,
                "/deputados",
                &[],
                &self.opts,
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
                // Partial pagination: keep what arrived, count the failure.
                outcome.errors += 1;
            }

            for item in collection.items {
                let legislator: Legislator = match serde_json::from_value(item) {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!("skipping malformed legislator record: {}", e);
                        outcome.errors += 1;
                        continue;
                    }
                };
                let payload = json!({
                    "external_id": legislator.id.to_string(),
                    "name": legislator.nome,
                    "party": legislator.sigla_partido,
                    "state": legislator.sigla_uf,
                    "author_code": serde_json::Value::Null,
                    "email": legislator.email,
                });
                outcome.records.push(SourceRecord {
                    payload,
                    provenance: Provenance::now(self.name(), "/deputados"),
                });
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
    async fn maps_legislators_to_canonical_payloads() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "dados": [
                {"id": 1, "nome": "Zucco", "siglaPartido": "PL", "siglaUf": "RS"},
                {"id": "not-a-number", "nome": 5}
            ],
            "links": []
        })
        .to_string();
        Mock::given(method("GET"))
            .and(path("/deputados"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = ApiLegislatorSource::new(fetcher(&server.uri(), &dir), PaginateOptions::default());
        let outcome = source.collect(2025, &CancelFlag::new()).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.errors, 1);
        let payload = &outcome.records[0].payload;
        assert_eq!(payload["external_id"], "1");
        assert_eq!(payload["name"], "Zucco");
        assert_eq!(outcome.records[0].provenance.source_name, "camara-api/deputados");
    }
}
