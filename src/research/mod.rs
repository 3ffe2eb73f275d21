//! Competitive research: search the keyword, fetch the ranking pages and
//! summarize their structure for the generation context.

pub mod google;
pub mod page;

use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::article::CompetitorSummary;
use crate::config::ResearchConfig;
use crate::error::{AutoblogError, Result};
use crate::retry::RetryPolicy;

pub use google::GoogleSearch;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; autoblog/0.1)";

pub struct Researcher {
    search: GoogleSearch,
    client: Client,
    pages: usize,
    batch_size: usize,
    excerpt_chars: usize,
}

impl Researcher {
    pub fn new(config: &ResearchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AutoblogError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            search: GoogleSearch::new(config)?,
            client,
            pages: config.pages,
            batch_size: config.batch_size.max(1),
            excerpt_chars: config.excerpt_chars,
        })
    }

    /// Backoff for the search call.  Page fetches are not retried; a page
    /// that fails is skipped.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.search = self.search.with_retry(retry);
        self
    }

    /// Summaries of up to `pages` top-ranking pages for `keyword`.
    ///
    /// Candidates are fetched concurrently in batches; unreachable or
    /// garbled pages are skipped.  Fails with `NotFound` when the search
    /// itself returns nothing.
    pub async fn gather(&self, keyword: &str) -> Result<Vec<CompetitorSummary>> {
        let links = self.search.search(keyword, self.pages * 2).await?;
        if links.is_empty() {
            return Err(AutoblogError::NotFound(format!(
                "no search results for \"{keyword}\""
            )));
        }

        let mut summaries = Vec::with_capacity(self.pages);
        for batch in links.chunks(self.batch_size) {
            if summaries.len() >= self.pages {
                break;
            }
            let fetched = join_all(batch.iter().map(|url| self.fetch(url))).await;
            for (url, html) in batch.iter().zip(fetched) {
                let Some(html) = html else { continue };
                if summaries.len() >= self.pages {
                    break;
                }
                summaries.push(page::summarize(url, &html, self.excerpt_chars));
            }
        }

        info!(keyword, candidates = links.len(), pages = summaries.len(), "research complete");
        Ok(summaries)
    }

    async fn fetch(&self, url: &str) -> Option<String> {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url, error = %e, "page fetch failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(url, status = %resp.status(), "page fetch returned error status");
            return None;
        }
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url, error = %e, "failed to read page body");
                return None;
            }
        };

        let cleaned = page::clean(&body);
        if cleaned.is_none() {
            warn!(url, "skipping garbled page");
        } else {
            debug!(url, len = body.len(), "page fetched");
        }
        cleaned
    }
}
