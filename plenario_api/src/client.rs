//! HTTP clients for the Câmara dos Deputados and Portal da Transparência
//! open-data APIs.

use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    query::{AmendmentQuery, ExpenseQuery, LegislatorQuery, PropositionQuery, Query, VoteQuery},
    types::{
        Amendment, ApiPage, ApiResponse, Expense, Legislator, LegislatorDetail, Proposition, Vote,
    },
    user_agent::get_user_agent,
    Error,
};

/// Per-request timeout for API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for bulk archive downloads, which can run to hundreds of MB.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for the Câmara dos Deputados open-data API.
///
/// Sends requests with browser-like headers and a randomized user agent;
/// some government hosts reject default HTTP client user agents.
pub struct CamaraClient {
    /// Base URL for the API. Defaults to `https://dadosabertos.camara.leg.br/api/v2`.
    base_api_url: String,
}

impl Default for CamaraClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CamaraClient {
    /// Creates a new client pointing at the production Câmara API.
    pub fn new() -> Self {
        Self {
            base_api_url: "https://dadosabertos.camara.leg.br/api/v2".to_string(),
        }
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_api_url: base_url.to_string(),
        }
    }

    /// The configured base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_api_url
    }

    fn get_url(&self, path: &str, query: Option<&impl Query>) -> Result<Url, Error> {
        let url = Url::parse(format!("{}{}", &self.base_api_url, path).as_str()).map_err(|e| {
            tracing::error!("Invalid URL constructed: {}", e);
            Error::RequestFailed
        })?;
        Ok(match query {
            Some(query) => query.add_to_url(&url),
            None => url,
        })
    }

    async fn get<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, Error>
    where
        T: DeserializeOwned,
        Q: Query,
    {
        let url = self.get_url(path, query)?;
        let body = request_json(url.as_str(), &[], None).await?;
        serde_json::from_str::<T>(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse resource: {} | body: {}", e, snippet);
            Error::Decode(e.to_string())
        })
    }

    /// Fetches one page of legislators matching the given query.
    pub async fn get_legislators(
        &self,
        query: &LegislatorQuery,
    ) -> Result<ApiPage<Legislator>, Error> {
        self.get::<ApiPage<Legislator>, LegislatorQuery>("/deputados", Some(query))
            .await
    }

    /// Fetches a single legislator's detail record by numeric id.
    pub async fn get_legislator(
        &self,
        legislator_id: i64,
    ) -> Result<ApiResponse<LegislatorDetail>, Error> {
        self.get::<ApiResponse<LegislatorDetail>, LegislatorQuery>(
            format!("/deputados/{}", legislator_id).as_str(),
            None,
        )
        .await
    }

    /// Fetches one page of expense documents for a legislator.
    pub async fn get_expenses(
        &self,
        legislator_id: i64,
        query: &ExpenseQuery,
    ) -> Result<ApiPage<Expense>, Error> {
        self.get::<ApiPage<Expense>, ExpenseQuery>(
            format!("/deputados/{}/despesas", legislator_id).as_str(),
            Some(query),
        )
        .await
    }

    /// Fetches one page of roll-call votes matching the given query.
    pub async fn get_votes(&self, query: &VoteQuery) -> Result<ApiPage<Vote>, Error> {
        self.get::<ApiPage<Vote>, VoteQuery>("/votacoes", Some(query))
            .await
    }

    /// Fetches one page of propositions matching the given query.
    pub async fn get_propositions(
        &self,
        query: &PropositionQuery,
    ) -> Result<ApiPage<Proposition>, Error> {
        self.get::<ApiPage<Proposition>, PropositionQuery>("/proposicoes", Some(query))
            .await
    }

    /// Raw JSON fetch for a path plus explicit query pairs, with an
    /// optional per-call timeout override. Used by the pipeline's generic
    /// fetch layer, which handles caching and retries.
    pub async fn get_json(
        &self,
        path: &str,
        params: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, Error> {
        let mut url = Url::parse(format!("{}{}", &self.base_api_url, path).as_str())
            .map_err(|_| Error::RequestFailed)?;
        for (key, value) in params {
            url.query_pairs_mut().append_pair(key, value);
        }
        let body = request_json(url.as_str(), &[], timeout).await?;
        serde_json::from_str(&body).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Client for the Portal da Transparência API, which authenticates with a
/// static `chave-api-dados` header.
pub struct TransparenciaClient {
    base_api_url: String,
    api_key: String,
}

impl TransparenciaClient {
    /// Creates a new client pointing at the production Transparência API.
    pub fn new(api_key: String) -> Self {
        Self {
            base_api_url: "https://api.portaldatransparencia.gov.br/api-de-dados".to_string(),
            api_key,
        }
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str, api_key: String) -> Self {
        Self {
            base_api_url: base_url.to_string(),
            api_key,
        }
    }

    /// The configured base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_api_url
    }

    /// Fetches one page of budget amendments. The API returns a bare array;
    /// an empty or short page signals the end of the result set.
    pub async fn get_amendments(&self, query: &AmendmentQuery) -> Result<Vec<Amendment>, Error> {
        let url = Url::parse(format!("{}/emendas", &self.base_api_url).as_str())
            .map_err(|_| Error::RequestFailed)?;
        let url = query.add_to_url(&url);
        let body = request_json(url.as_str(), &[("chave-api-dados", &self.api_key)], None).await?;
        serde_json::from_str(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse amendments: {} | body: {}", e, snippet);
            Error::Decode(e.to_string())
        })
    }

    /// Raw JSON fetch with the API-key header attached and an optional
    /// per-call timeout override.
    pub async fn get_json(
        &self,
        path: &str,
        params: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, Error> {
        let mut url = Url::parse(format!("{}{}", &self.base_api_url, path).as_str())
            .map_err(|_| Error::RequestFailed)?;
        for (key, value) in params {
            url.query_pairs_mut().append_pair(key, value);
        }
        let body =
            request_json(url.as_str(), &[("chave-api-dados", &self.api_key)], timeout).await?;
        serde_json::from_str(&body).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Downloads a bulk payload (ZIP archive or JSON dump) with browser-like
/// headers. Returns the raw bytes plus the response content type, so callers
/// can reject HTML error pages served with a 200 status.
pub async fn download_bytes(url: &str) -> Result<(Vec<u8>, String), Error> {
    let client = reqwest::Client::builder()
        .user_agent(get_user_agent())
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| {
            tracing::error!("Failed to build HTTP client: {}", e);
            Error::RequestFailed
        })?;
    let resp = client
        .get(url)
        .header("accept", "application/zip,application/octet-stream,*/*")
        .header("accept-language", "pt-BR,pt;q=0.8,en-US;q=0.5,en;q=0.3")
        .send()
        .await
        .map_err(|e| {
            tracing::error!("Failed to download {}: {}", url, e);
            Error::RequestFailed
        })?;

    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let bytes = resp.bytes().await.map_err(|e| {
        tracing::error!("Failed to read download body: {}", e);
        Error::RequestFailed
    })?;

    if !status.is_success() {
        let snippet = truncate_body(&String::from_utf8_lossy(&bytes));
        tracing::error!("Download failed with status {}: {}", status, snippet);
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            body: snippet,
        });
    }

    Ok((bytes.to_vec(), content_type))
}

async fn request_json(
    url: &str,
    extra_headers: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<String, Error> {
    let client = reqwest::Client::builder()
        .user_agent(get_user_agent())
        .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
        .build()
        .map_err(|e| {
            tracing::error!("Failed to build HTTP client: {}", e);
            Error::RequestFailed
        })?;
    let mut req = client
        .get(url)
        .header("accept", "application/json, text/plain, */*")
        .header("accept-language", "pt-BR,pt;q=0.8,en-US;q=0.5,en;q=0.3");
    for (key, value) in extra_headers {
        req = req.header(*key, *value);
    }
    let resp = req.send().await.map_err(|e| {
        tracing::error!("Failed to get resource: {}", e);
        Error::RequestFailed
    })?;

    let status = resp.status();
    let body = resp.text().await.map_err(|e| {
        tracing::error!("Failed to read response body: {}", e);
        Error::RequestFailed
    })?;

    if !status.is_success() {
        let snippet = truncate_body(&body);
        tracing::error!("Request failed with status {}: {}", status, snippet);
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            body: snippet,
        });
    }

    Ok(body)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        body.to_string()
    } else {
        format!("{}...[truncated]", &body[..MAX])
    }
}
