use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ResearchConfig;
use crate::error::{AutoblogError, Result};
use crate::retry::{RetryPolicy, is_retryable_status};

const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// The API never returns more than ten results per request.
const MAX_RESULTS: u32 = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}

/// Google Custom Search JSON API client.
pub struct GoogleSearch {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
    api_key: String,
    cse_id: String,
    excluded_domains: Vec<String>,
}

impl GoogleSearch {
    pub fn new(config: &ResearchConfig) -> Result<Self> {
        if config.google_api_key.is_empty() || config.google_cse_id.is_empty() {
            return Err(AutoblogError::Config(
                "Google API key and CSE id are required for research".into(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AutoblogError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: SEARCH_URL.to_string(),
            retry: RetryPolicy::default(),
            api_key: config.google_api_key.clone(),
            cse_id: config.google_cse_id.clone(),
            excluded_domains: config.excluded_domains.clone(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Search `query` and return up to `keep` result links, skipping
    /// excluded domains.
    pub async fn search(&self, query: &str, keep: usize) -> Result<Vec<String>> {
        debug!(query, keep, "executing Google search");
        let parsed = self.request(query, false).await?;
        let links = self.keep_links(parsed.items.into_iter().map(|i| i.link), keep);

        info!(query, results = links.len(), "Google search complete");
        Ok(links)
    }

    /// Image search: direct image URLs, best match first.
    pub async fn images(&self, query: &str) -> Result<Vec<String>> {
        debug!(query, "executing Google image search");
        let parsed = self.request(query, true).await?;
        let links: Vec<String> = parsed.items.into_iter().map(|i| i.link).collect();

        info!(query, results = links.len(), "Google image search complete");
        Ok(links)
    }

    async fn request(&self, query: &str, images: bool) -> Result<SearchResponse> {
        let num = MAX_RESULTS.to_string();
        let mut params = vec![
            ("q", query),
            ("cx", self.cse_id.as_str()),
            ("key", self.api_key.as_str()),
            ("num", num.as_str()),
        ];
        if images {
            params.push(("searchType", "image"));
        }
        let params = params.as_slice();

        self.retry
            .run("google search", move || async move {
                let resp = self.client.get(&self.endpoint).query(params).send().await?;

                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    warn!(status = %status, body = %body, "Google search failed");
                    let message = format!("Google search returned {status}: {body}");
                    return Err(if is_retryable_status(status) {
                        AutoblogError::Transport(message)
                    } else {
                        AutoblogError::Research(message)
                    });
                }

                resp.json().await.map_err(|e| {
                    AutoblogError::Research(format!("failed to parse Google search response: {e}"))
                })
            })
            .await
    }

    fn keep_links(&self, links: impl Iterator<Item = String>, keep: usize) -> Vec<String> {
        links
            .filter(|link| !is_excluded(link, &self.excluded_domains))
            .take(keep)
            .collect()
    }
}

/// Whether `link`'s host is one of `domains` or a subdomain of one.
pub fn is_excluded(link: &str, domains: &[String]) -> bool {
    let Some(host) = Url::parse(link).ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return true;
    };
    domains.iter().any(|d| {
        let d = d.trim_start_matches('.').to_lowercase();
        host == d || host.ends_with(&format!(".{d}"))
    })
}
