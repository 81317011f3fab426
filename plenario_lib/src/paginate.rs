//! Automatic pagination over the upstream APIs.
//!
//! Caching is disabled for page fetches: pages are numerous and read once,
//! and caching them would bloat the response cache that exists for
//! single-resource lookups.

use serde_json::Value;

use crate::error::PipelineError;
use crate::fetch::{RateLimitedFetcher, Upstream};
use crate::shutdown::CancelFlag;

/// Page/item ceilings for one paginated pull.
#[derive(Debug, Clone)]
pub struct PaginateOptions {
    pub max_pages: Option<usize>,
    pub max_items: Option<usize>,
    pub page_size: i64,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_items: None,
            page_size: 100,
        }
    }
}

/// Result of a paginated pull. On a mid-pagination failure the items
/// accumulated so far are kept and the error is carried alongside them.
pub struct PageCollection {
    pub items: Vec<Value>,
    pub error: Option<PipelineError>,
}

impl PageCollection {
    /// True when pagination ended without an error.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Walks `endpoint` page by page through the shared fetcher, starting at
/// page 1 and never revisiting a page.
///
/// Stops when a page comes back empty, the source stops signalling a next
/// page (no `next` link for Câmara envelopes, a short page for bare-array
/// responses), a ceiling from `opts` is reached, or the run is cancelled.
pub async fn paginate(
    fetcher: &RateLimitedFetcher,
    upstream: Upstream,
    endpoint: &str,
    base_params: &[(String, String)],
    opts: &PaginateOptions,
    cancel: &CancelFlag,
) -> PageCollection {
    let mut all_items: Vec<Value> = Vec::new();
    let mut page: i64 = 1;
    let mut pages_processed = 0usize;

    loop {
        if cancel.is_cancelled() {
            return PageCollection {
                items: all_items,
                error: Some(PipelineError::Cancelled),
            };
        }

        let mut params: Vec<(String, String)> = base_params.to_vec();
        params.push(("pagina".to_string(), page.to_string()));
        params.push(("itens".to_string(), opts.page_size.to_string()));

        tracing::debug!("fetching {} page {}", endpoint, page);
        let body = match fetcher.fetch_json(upstream, endpoint, &params, false).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    "pagination of {} aborted at page {} with {} items collected: {}",
                    endpoint,
                    page,
                    all_items.len(),
                    e
                );
                return PageCollection {
                    items: all_items,
                    error: Some(e),
                };
            }
        };

        let (items, has_next) = split_page(&body, opts.page_size);
        if items.is_empty() {
            tracing::debug!("{} page {} empty, stopping", endpoint, page);
            break;
        }

        tracing::debug!(
            "{} page {}: +{} items (total {})",
            endpoint,
            page,
            items.len(),
            all_items.len() + items.len()
        );
        all_items.extend(items);
        pages_processed += 1;

        if let Some(max_pages) = opts.max_pages {
            if pages_processed >= max_pages {
                tracing::debug!("{}: page ceiling ({}) reached", endpoint, max_pages);
                break;
            }
        }
        if let Some(max_items) = opts.max_items {
            if all_items.len() >= max_items {
                tracing::debug!("{}: item ceiling ({}) reached", endpoint, max_items);
                break;
            }
        }
        if !has_next {
            break;
        }

        page += 1;
    }

    PageCollection {
        items: all_items,
        error: None,
    }
}

/// Splits one response body into its items and whether the source signals a
/// further page.
fn split_page(body: &Value, page_size: i64) -> (Vec<Value>, bool) {
    match body {
        // Câmara envelope: items under "dados", cursor via the "next" link.
        Value::Object(map) => {
            let items: Vec<Value> = map
                .get("dados")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default();
            let has_next = map
                .get("links")
                .and_then(|l| l.as_array())
                .map(|links| {
                    links.iter().any(|link| {
                        link.get("rel").and_then(|r| r.as_str()) == Some("next")
                    })
                })
                .unwrap_or(false);
            (items, has_next)
        }
        // Transparência style: a bare array; a short page is the last one.
        Value::Array(items) => {
            let has_next = items.len() as i64 >= page_size;
            (items.clone(), has_next)
        }
        _ => (Vec::new(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::cache::DiskCache;
    use crate::config::FetchConfig;
    use plenario_api::CamaraClient;

    fn test_fetcher(uri: &str, dir: &tempfile::TempDir) -> RateLimitedFetcher {
        let cache = Arc::new(DiskCache::open(dir.path(), Duration::from_secs(60)).unwrap());
        let cfg = FetchConfig {
            min_interval_ms: 0,
            max_retries: 0,
            base_backoff_ms: 1,
            max_backoff_ms: 1,
            rate_limit_cooldown_ms: 1,
            ..FetchConfig::default()
        };
        RateLimitedFetcher::new(
            CamaraClient::with_base_url(uri),
            None,
            cache,
            cfg,
            CancelFlag::new(),
        )
    }

    fn page_body(ids: &[i64], next: bool) -> String {
        let dados: Vec<serde_json::Value> =
            ids.iter().map(|id| serde_json::json!({"id": id})).collect();
        let mut links = vec![serde_json::json!({"rel": "self", "href": "x"})];
        if next {
            links.push(serde_json::json!({"rel": "next", "href": "y"}));
        }
        serde_json::json!({"dados": dados, "links": links}).to_string()
    }

    #[tokio::test]
    async fn follows_next_links_until_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deputados"))
            .and(query_param("pagina", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[1, 2], true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deputados"))
            .and(query_param("pagina", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[3], false)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(&server.uri(), &dir);

        let result = paginate(
            &fetcher,
            Upstream::Camara,
            "/deputados",
            &[],
            &PaginateOptions::default(),
            &CancelFlag::new(),
        )
        .await;

        assert!(result.is_complete());
        assert_eq!(result.items.len(), 3);
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/votacoes"))
            .and(query_param("pagina", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[1], true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/votacoes"))
            .and(query_param("pagina", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[], true)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(&server.uri(), &dir);

        let result = paginate(
            &fetcher,
            Upstream::Camara,
            "/votacoes",
            &[],
            &PaginateOptions::default(),
            &CancelFlag::new(),
        )
        .await;

        assert!(result.is_complete());
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn respects_page_ceiling() {
        let server = MockServer::start().await;
        // Every page claims a next page exists.
        Mock::given(method("GET"))
            .and(path("/proposicoes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[7], true)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(&server.uri(), &dir);

        let opts = PaginateOptions {
            max_pages: Some(3),
            ..PaginateOptions::default()
        };
        let result = paginate(
            &fetcher,
            Upstream::Camara,
            "/proposicoes",
            &[],
            &opts,
            &CancelFlag::new(),
        )
        .await;

        assert!(result.is_complete());
        assert_eq!(result.items.len(), 3);
    }

    #[tokio::test]
    async fn respects_item_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proposicoes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[1, 2, 3], true)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(&server.uri(), &dir);

        let opts = PaginateOptions {
            max_items: Some(5),
            ..PaginateOptions::default()
        };
        let result = paginate(
            &fetcher,
            Upstream::Camara,
            "/proposicoes",
            &[],
            &opts,
            &CancelFlag::new(),
        )
        .await;

        assert!(result.is_complete());
        // Stops once the ceiling is crossed; the page in flight is kept.
        assert_eq!(result.items.len(), 6);
    }

    #[tokio::test]
    async fn partial_results_survive_mid_pagination_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deputados"))
            .and(query_param("pagina", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[1, 2], true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deputados"))
            .and(query_param("pagina", "2"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(&server.uri(), &dir);

        let result = paginate(
            &fetcher,
            Upstream::Camara,
            "/deputados",
            &[],
            &PaginateOptions::default(),
            &CancelFlag::new(),
        )
        .await;

        assert!(!result.is_complete());
        assert_eq!(result.items.len(), 2);
        assert!(matches!(
            result.error,
            Some(PipelineError::Http { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn bare_array_short_page_stops() {
        let server = MockServer::start().await;
        let body = serde_json::json!([{"codigoEmenda": "1"}, {"codigoEmenda": "2"}]).to_string();
        Mock::given(method("GET"))
            .and(path("/emendas"))
            .and(query_param("pagina", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(&server.uri(), &dir);

        // Page size 100, only 2 items returned: last page.
        let result = paginate(
            &fetcher,
            Upstream::Camara,
            "/emendas",
            &[],
            &PaginateOptions::default(),
            &CancelFlag::new(),
        )
        .await;

        assert!(result.is_complete());
        assert_eq!(result.items.len(), 2);
    }

    #[tokio::test]
    async fn cancellation_keeps_partial_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deputados"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[1], true)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(&server.uri(), &dir);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = paginate(
            &fetcher,
            Upstream::Camara,
            "/deputados",
            &[],
            &PaginateOptions::default(),
            &cancel,
        )
        .await;

        assert!(matches!(result.error, Some(PipelineError::Cancelled)));
        assert!(result.items.is_empty());
    }
}
