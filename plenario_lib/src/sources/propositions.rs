//! Proposition collection from the yearly bulk JSON dumps, with optional
//! AI summarization of each proposition's ementa.

use std::sync::Arc;

use serde_json::json;

use plenario_api::types::Proposition;

use crate::config::PropositionConfig;
use crate::error::PipelineError;
use crate::fetch::RateLimitedFetcher;
use crate::shutdown::CancelFlag;
use crate::summarize::Summarizer;

use super::{BoxFuture, CollectOutcome, Provenance, RecordSource, SourceRecord};

pub struct JsonDumpPropositionSource {
    fetcher: Arc<RateLimitedFetcher>,
    cfg: PropositionConfig,
    /// Opaque text service; when present, each kept proposition gets an
    /// `ai_summary`/`ai_score` annotation. Failures leave the record
    /// unsummarized and are counted, per the record-level error policy.
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl JsonDumpPropositionSource {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        cfg: PropositionConfig,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        Self {
            fetcher,
            cfg,
            summarizer,
        }
    }
}

impl RecordSource for JsonDumpPropositionSource {
    fn name(&self) -> &str {
        "camara-archive/proposicoes-json"
    }

    fn collect<'a>(
        &'a self,
        year: i32,
        cancel: &'a CancelFlag,
    ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>> {
        Box::pin(async move {
            let url = format!(
                "{}/proposicoes/json/proposicoes-{}.json",
                self.cfg.archive_base_url, year
            );
            let bytes = self.fetcher.fetch_bytes(&url, true).await?;
            let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                PipelineError::MalformedSourceData(format!(
                    "proposition dump is not JSON: {}",
                    e
                ))
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
                        tracing::debug!("proposition ceiling ({}) reached", max);
                        break;
                    }
                }

                let prop: Proposition = match serde_json::from_value(item) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("skipping malformed proposition: {}", e);
                        outcome.errors += 1;
                        continue;
                    }
                };

                let kind = prop.sigla_tipo.clone().unwrap_or_default();
                if !self.cfg.kinds.is_empty() && !self.cfg.kinds.contains(&kind) {
                    continue;
                }

                let mut payload = json!({
                    "external_id": prop.id.to_string(),
                    "kind": kind,
                    "number": prop.numero,
                    "year": prop.ano,
                    "summary": prop.ementa,
                });

                let ementa = payload["summary"].as_str().map(|s| s.to_string());
                if let (Some(summarizer), Some(ementa)) = (&self.summarizer, ementa) {
                    match summarizer.summarize(&ementa).await {
                        Ok(summary) => {
                            payload["ai_summary"] = json!(summary);
                            match summarizer.score(&summary).await {
                                Ok(score) => payload["ai_score"] = score,
                                Err(e) => {
                                    tracing::warn!("scoring failed, keeping summary only: {}", e);
                                    outcome.errors += 1;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!("summarization failed, record kept plain: {}", e);
                            outcome.errors += 1;
                        }
                    }
                }

                outcome.records.push(SourceRecord {
                    payload,
                    provenance: Provenance::now(self.name(), &url),
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
    use crate::summarize::StaticSummarizer;
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

    fn dump_body() -> String {
        serde_json::json!({
            "dados": [
                {"id": 1, "siglaTipo": "PL", "numero": 10, "ano": 2025, "ementa": "Dispõe sobre X."},
                {"id": 2, "siglaTipo": "REQ", "numero": 11, "ano": 2025, "ementa": "Requer Y."},
                {"id": 3, "siglaTipo": "PEC", "numero": 12, "ano": 2025, "ementa": "Altera Z."}
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn filters_by_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proposicoes/json/proposicoes-2025.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(dump_body()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = PropositionConfig {
            archive_base_url: server.uri(),
            kinds: vec!["PL".to_string(), "PEC".to_string()],
            ..PropositionConfig::default()
        };
        let source = JsonDumpPropositionSource::new(fetcher(&server.uri(), &dir), cfg, None);
        let outcome = source.collect(2025, &CancelFlag::new()).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].payload["kind"], "PL");
        assert_eq!(outcome.records[1].payload["kind"], "PEC");
    }

    #[tokio::test]
    async fn summarizer_annotates_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proposicoes/json/proposicoes-2025.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(dump_body()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = PropositionConfig {
            archive_base_url: server.uri(),
            kinds: vec!["PL".to_string()],
            ..PropositionConfig::default()
        };
        let summarizer = Arc::new(StaticSummarizer::new(
            "resumo",
            serde_json::json!({"relevance": 7}),
        ));
        let source =
            JsonDumpPropositionSource::new(fetcher(&server.uri(), &dir), cfg, Some(summarizer));
        let outcome = source.collect(2025, &CancelFlag::new()).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].payload["ai_summary"], "resumo");
        assert_eq!(outcome.records[0].payload["ai_score"]["relevance"], 7);
        assert_eq!(outcome.errors, 0);
    }
}
