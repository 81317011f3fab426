//! Budget amendment collection.
//!
//! Two sources, in priority order: the Portal da Transparência bulk CSV
//! download (complete yearly data, includes author codes) and the
//! Transparência REST API. Author attribution happens downstream in the
//! orchestrator; rows carry the free-text author name and, when present,
//! the numeric author code.

use std::sync::Arc;

use serde_json::json;

use plenario_api::types::Amendment;

use crate::cache::{object_path, ObjectStore};
use crate::config::AmendmentConfig;
use crate::error::PipelineError;
use crate::fetch::{RateLimitedFetcher, Upstream};
use crate::paginate::{paginate, PaginateOptions};
use crate::shutdown::CancelFlag;
use crate::tabular::{parse_money, TabularIngestor};

use super::{BoxFuture, CollectOutcome, Provenance, RecordSource, SourceRecord};

/// Maps the CSV/API amendment category label to the short type code.
fn map_amendment_type(label: &str) -> &'static str {
    match label.trim().to_uppercase().as_str() {
        "EMENDA INDIVIDUAL" => "EMD",
        "EMENDA DE BANCADA" => "EMB",
        "EMENDA DE COMISSÃO" | "EMENDA DE COMISSAO" => "EMC",
        "EMENDA DE RELATOR" => "EMR",
        _ => "EMD",
    }
}

/// Parses the author-code cell. The export uses "S/I" (sem informação) and
/// empty strings for absent codes.
fn parse_author_code(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("s/i") {
        return None;
    }
    trimmed.parse().ok()
}

/// Bulk CSV download from the Portal da Transparência.
pub struct CsvDownloadSource {
    fetcher: Arc<RateLimitedFetcher>,
    ingestor: TabularIngestor,
    cfg: AmendmentConfig,
    /// Write-through mirror for the raw archive, when configured.
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl CsvDownloadSource {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        cfg: AmendmentConfig,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let ingestor = TabularIngestor::new(Some(cfg.expected_csv_name.clone()));
        Self {
            fetcher,
            ingestor,
            cfg,
            object_store,
        }
    }

    fn row_to_record(&self, row: &std::collections::HashMap<String, String>) -> Option<SourceRecord> {
        let code = row.get("codigo_emenda").map(|s| s.trim()).unwrap_or("");
        if code.is_empty() {
            return None;
        }

        let committed = row.get("valor_empenhado").map_or(0.0, |v| parse_money(v));
        let settled = row.get("valor_liquidado").map_or(0.0, |v| parse_money(v));
        let paid = row.get("valor_pago").map_or(0.0, |v| parse_money(v));
        // The largest of the three stages is the amendment's working value.
        let value = committed.max(settled).max(paid);
        if value < self.cfg.min_value {
            return None;
        }

        let year = row.get("ano").and_then(|v| v.trim().parse::<i32>().ok());
        let payload = json!({
            "external_id": code,
            "year": year,
            "amendment_type": map_amendment_type(
                row.get("tipo_emenda").map(|s| s.as_str()).unwrap_or("")
            ),
            "number": row.get("numero_emenda").cloned().unwrap_or_default(),
            "author_name": row.get("autor").cloned().unwrap_or_default(),
            "author_code": row
                .get("codigo_autor_emenda")
                .and_then(|v| parse_author_code(v)),
            "function": row.get("funcao").cloned(),
            "subfunction": row.get("subfuncao").cloned(),
            "locality": row.get("localidade").cloned(),
            "municipality": row.get("municipio").cloned(),
            "state": row.get("uf").cloned(),
            "committed_value": committed,
            "settled_value": settled,
            "paid_value": paid,
            "value": value,
        });
        Some(SourceRecord {
            payload,
            provenance: Provenance::now(self.name(), &self.cfg.download_url),
        })
    }
}

impl RecordSource for CsvDownloadSource {
    fn name(&self) -> &str {
        "transparencia-csv-download"
    }

    fn collect<'a>(
        &'a self,
        year: i32,
        cancel: &'a CancelFlag,
    ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>> {
        Box::pin(async move {
            let bytes = self.fetcher.fetch_bytes(&self.cfg.download_url, true).await?;

            if looks_like_html(&bytes) {
                return Err(PipelineError::SourceUnavailable(
                    "download returned an HTML page instead of an archive".to_string(),
                ));
            }
            if bytes.len() < self.cfg.min_archive_bytes {
                return Err(PipelineError::SourceUnavailable(format!(
                    "download too small to be the archive: {} bytes",
                    bytes.len()
                )));
            }

            if let Some(store) = &self.object_store {
                let path = object_path("amendments", year, "bulk", "emendas.zip");
                if let Err(e) = store.put(&path, &bytes, "application/zip", true) {
                    tracing::warn!("object store mirror failed for {}: {}", path, e);
                }
            }

            let table = self.ingestor.parse_year_filtered(&bytes, year)?;
            tracing::info!("amendment csv: {} rows for {}", table.len(), year);

            let mut outcome = CollectOutcome::default();
            for row in &table.rows {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                match self.row_to_record(row) {
                    Some(record) => outcome.records.push(record),
                    None => {
                        // Rows without a code or below the value floor are
                        // unusable, not errors.
                        tracing::debug!("dropping unusable amendment row");
                    }
                }
            }
            Ok(outcome)
        })
    }
}

/// Paginated fallback against the Transparência REST API.
pub struct TransparenciaApiSource {
    fetcher: Arc<RateLimitedFetcher>,
    cfg: AmendmentConfig,
}

impl TransparenciaApiSource {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, cfg: AmendmentConfig) -> Self {
        Self { fetcher, cfg }
    }
}

impl RecordSource for TransparenciaApiSource {
    fn name(&self) -> &str {
        "transparencia-api/emendas"
    }

    fn collect<'a>(
        &'a self,
        year: i32,
        cancel: &'a CancelFlag,
    ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>> {
        Box::pin(async move {
            let params = vec![("ano".to_string(), year.to_string())];
            let opts = PaginateOptions {
                max_pages: self.cfg.max_pages,
                max_items: None,
                page_size: self.cfg.page_size,
            };
            let collection = paginate(
                &self.fetcher,
                Upstream::Transparencia,
                "/emendas",
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
                let amendment: Amendment = match serde_json::from_value(item) {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!("skipping malformed amendment record: {}", e);
                        outcome.errors += 1;
                        continue;
                    }
                };
                let Some(code) = amendment
                    .codigo_emenda
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                else {
                    outcome.errors += 1;
                    continue;
                };

                let committed = amendment.valor_empenhado.as_deref().map_or(0.0, parse_money);
                let settled = amendment.valor_liquidado.as_deref().map_or(0.0, parse_money);
                let paid = amendment.valor_pago.as_deref().map_or(0.0, parse_money);
                let value = committed.max(settled).max(paid);
                if value < self.cfg.min_value {
                    continue;
                }

                let payload = json!({
                    "external_id": code,
                    "year": amendment.ano,
                    "amendment_type": map_amendment_type(
                        amendment.tipo_emenda.as_deref().unwrap_or("")
                    ),
                    "number": amendment.numero_emenda.clone().unwrap_or_default(),
                    "author_name": amendment.autor.clone().unwrap_or_default(),
                    "author_code": amendment
                        .codigo_autor
                        .as_deref()
                        .and_then(parse_author_code),
                    "function": amendment.funcao,
                    "subfunction": amendment.subfuncao,
                    "locality": amendment.localidade_do_gasto,
                    "municipality": serde_json::Value::Null,
                    "state": serde_json::Value::Null,
                    "committed_value": committed,
                    "settled_value": settled,
                    "paid_value": paid,
                    "value": value,
                });
                outcome.records.push(SourceRecord {
                    payload,
                    provenance: Provenance::now(self.name(), "/emendas"),
                });
            }

            Ok(outcome)
        })
    }
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let lowered = String::from_utf8_lossy(head).to_lowercase();
    let trimmed = lowered.trim_start();
    trimmed.starts_with("<!doctype") || trimmed.starts_with("<html")
}
