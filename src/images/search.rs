use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info, warn};

use crate::config::{ImagesConfig, ResearchConfig};
use crate::error::{AutoblogError, Result};
use crate::research::GoogleSearch;
use crate::retry::RetryPolicy;

use super::{GeneratedImage, ImageGenerator};

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Images found on the web instead of generated: search, HEAD-check the
/// JPEG/PNG candidates concurrently, download the best one that answers.
pub struct ImageSearch {
    search: GoogleSearch,
    client: Client,
    suffix: String,
    candidates: usize,
}

impl ImageSearch {
    pub fn new(research: &ResearchConfig, images: &ImagesConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(research.timeout_secs.max(1)))
            .build()
            .map_err(|e| AutoblogError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            search: GoogleSearch::new(research)?,
            client,
            suffix: images.search_suffix.trim().to_string(),
            candidates: images.search_candidates.max(1),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.search = self.search.with_retry(retry);
        self
    }

    fn search_query(&self, query: &str) -> String {
        if self.suffix.is_empty() {
            query.to_string()
        } else {
            format!("{query} {}", self.suffix)
        }
    }

    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).timeout(CHECK_TIMEOUT).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                debug!(url, error = %e, "image candidate unreachable");
                false
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AutoblogError::Research(format!(
                "image download returned {status}"
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// File extension for a JPEG or PNG URL; other formats are not used.
fn image_extension(url: &str) -> Option<&'static str> {
    let path = Url::parse(url).ok()?.path().to_ascii_lowercase();
    if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        Some("jpg")
    } else if path.ends_with(".png") {
        Some("png")
    } else {
        None
    }
}

#[async_trait::async_trait]
impl ImageGenerator for ImageSearch {
    async fn generate(&self, query: &str) -> Result<GeneratedImage> {
        let links = self.search.images(&self.search_query(query)).await?;
        let candidates: Vec<(String, &'static str)> = links
            .into_iter()
            .filter_map(|link| image_extension(&link).map(|ext| (link, ext)))
            .take(self.candidates)
            .collect();

        let checked = join_all(candidates.iter().map(|(url, _)| self.is_reachable(url))).await;
        let reachable = checked.iter().filter(|ok| **ok).count();
        info!(query, candidates = candidates.len(), reachable, "image candidates checked");

        for ((url, extension), ok) in candidates.into_iter().zip(checked) {
            if !ok {
                continue;
            }
            match self.download(&url).await {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!(url = %url, size = bytes.len(), "image downloaded");
                    return Ok(GeneratedImage { bytes, extension });
                }
                Ok(_) => warn!(url = %url, "image download was empty"),
                Err(e) => warn!(url = %url, error = %e, "image download failed"),
            }
        }

        Err(AutoblogError::NotFound(format!(
            "no reachable JPEG or PNG image for \"{query}\""
        )))
    }
}
