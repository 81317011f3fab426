//! Parliamentary expense (CEAP) collection, one legislator at a time.

use std::sync::Arc;

use serde_json::json;

use plenario_api::types::Expense;

use crate::config::ExpenseConfig;
use crate::error::PipelineError;
use crate::fetch::{RateLimitedFetcher, Upstream};
use crate::paginate::{paginate, PaginateOptions};
use crate::shutdown::CancelFlag;

use super::{BoxFuture, CollectOutcome, Provenance, RecordSource, SourceRecord};

/// Fetches the expense documents of a single legislator. The orchestrator
/// runs one of these per legislator through the worker pool.
pub struct ApiExpenseSource {
    fetcher: Arc<RateLimitedFetcher>,
    /// The legislator's id in the Câmara API (path segment).
    api_id: i64,
    /// The legislator's id in our store (key component).
    entity_id: i64,
    cfg: ExpenseConfig,
}

impl ApiExpenseSource {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        api_id: i64,
        entity_id: i64,
        cfg: ExpenseConfig,
    ) -> Self {
        Self {
            fetcher,
            api_id,
            entity_id,
            cfg,
        }
    }
}

impl RecordSource for ApiExpenseSource {
    fn name(&self) -> &str {
        "camara-api/despesas"
    }

    fn collect<'a>(
        &'a self,
        year: i32,
        cancel: &'a CancelFlag,
    ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>> {
        Box::pin(async move {
            let endpoint = format!("/deputados/{}/despesas", self.api_id);
            let mut params: Vec<(String, String)> =
                vec![("ano".to_string(), year.to_string())];
            for month in &self.cfg.months {
                params.push(("mes".to_string(), month.to_string()));
            }

            let opts = PaginateOptions {
                max_pages: self.cfg.max_pages,
                max_items: None,
                page_size: self.cfg.page_size,
            };
            let collection = paginate(
                &self.fetcher,
                Upstream::Camara,
                &endpoint,
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
                let expense: Expense = match serde_json::from_value(item) {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!("skipping malformed expense record: {}", e);
                        outcome.errors += 1;
                        continue;
                    }
                };

                let net_value = expense
                    .valor_liquido
                    .or(expense.valor_documento)
                    .unwrap_or(0.0);
                if net_value < self.cfg.min_value {
                    continue;
                }

                let payload = json!({
                    "legislator_id": self.entity_id,
                    "year": expense.ano,
                    "month": expense.mes,
                    "document_number": expense.num_documento.clone().unwrap_or_default(),
                    "net_value": net_value,
                    "gross_value": expense.valor_documento,
                    "gloss_value": expense.valor_glosa,
                    "category": expense.tipo_despesa,
                    "supplier": expense.nome_fornecedor,
                    "supplier_tax_id": expense.cnpj_cpf_fornecedor,
                    "document_date": expense.data_documento,
                    "document_url": expense.url_documento,
                });
                outcome.records.push(SourceRecord {
                    payload,
                    provenance: Provenance::now(self.name(), &endpoint),
                });
            }

            Ok(outcome)
        })
    }
}
