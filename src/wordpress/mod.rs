//! WordPress REST API client: taxonomy, post lookup, media upload and post
//! creation.

pub mod payload;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::article::RelatedArticle;
use crate::config::WordPressConfig;
use crate::error::{AutoblogError, Result};
use crate::retry::{RetryPolicy, is_retryable_status};

pub use payload::{PostDraft, Taxonomy};

/// How a post is addressed: numeric id or slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostRef {
    Id(u64),
    Slug(String),
}

impl PostRef {
    /// Numeric strings are ids, anything else a slug.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<u64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Slug(raw.to_string()),
        }
    }
}

impl std::fmt::Display for PostRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Slug(slug) => f.write_str(slug),
        }
    }
}

/// Projections `post_info` can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostField {
    Title,
    FirstParagraphs,
    Categories,
    Tags,
    Url,
}

impl PostField {
    pub const ALL: &'static [PostField] = &[
        PostField::Title,
        PostField::FirstParagraphs,
        PostField::Categories,
        PostField::Tags,
        PostField::Url,
    ];
}

/// An uploaded media item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Media {
    pub id: u64,
    pub source_url: String,
}

/// A created post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedPost {
    pub id: u64,
    #[serde(default)]
    pub link: String,
}

// -- Wire types ---

#[derive(Deserialize)]
struct Term {
    id: u64,
    name: String,
}

#[derive(Deserialize, Default)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Deserialize)]
struct WpPost {
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    content: Rendered,
    #[serde(default)]
    categories: Vec<u64>,
    #[serde(default)]
    tags: Vec<u64>,
    #[serde(default)]
    link: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub struct WordPressClient {
    client: Client,
    api_base: String,
    username: String,
    password: String,
    retry: RetryPolicy,
}

impl WordPressClient {
    pub fn new(config: &WordPressConfig) -> Result<Self> {
        if config.site_url.is_empty() {
            return Err(AutoblogError::Config(
                "WordPress site URL required: set SITE_URL or wordpress.site_url".into(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AutoblogError::Config(format!("failed to create HTTP client: {e}")))?;

        let api_base = format!("{}/wp-json/wp/v2", config.site_url.trim_end_matches('/'));
        info!(api_base = %api_base, user = %config.username, "WordPress client initialized");

        Ok(Self {
            client,
            api_base,
            username: config.username.clone(),
            password: config.password.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        if self.username.is_empty() {
            req
        } else {
            req.basic_auth(&self.username, Some(&self.password))
        }
    }

    /// Send `req`, retrying rate limits, server errors, connect errors and
    /// timeouts.  Any status other than `expected` (or 2xx when `expected`
    /// is 200) is an error.
    async fn send(&self, req: RequestBuilder, what: &str, expected: StatusCode) -> Result<Response> {
        let req = self.authed(req);
        self.retry
            .run(what, || {
                let attempt = req.try_clone();
                async move {
                    let attempt = attempt.ok_or_else(|| {
                        AutoblogError::WordPress(format!("{what}: request cannot be repeated"))
                    })?;
                    check_status(attempt.send().await?, what, expected).await
                }
            })
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)], what: &str) -> Result<T> {
        let req = self.client.get(self.url(path)).query(query);
        let resp = self.send(req, what, StatusCode::OK).await?;
        resp.json()
            .await
            .map_err(|e| AutoblogError::WordPress(format!("failed to parse {what}: {e}")))
    }

    async fn terms(&self, taxonomy: &str) -> Result<Taxonomy> {
        let terms: Vec<Term> = self
            .get_json(taxonomy, &[("per_page", "100")], taxonomy)
            .await?;
        debug!(taxonomy, count = terms.len(), "terms fetched");
        Ok(terms.into_iter().map(|t| (t.id, t.name)).collect())
    }

    pub async fn categories(&self) -> Result<Taxonomy> {
        self.terms("categories").await
    }

    pub async fn tags(&self) -> Result<Taxonomy> {
        self.terms("tags").await
    }

    /// Create a term in `taxonomy` ("categories" or "tags") and return its id.
    pub async fn create_term(&self, taxonomy: &str, name: &str) -> Result<u64> {
        let req = self
            .client
            .post(self.url(taxonomy))
            .json(&serde_json::json!({ "name": name }));
        let resp = self.send(req, "create term", StatusCode::CREATED).await?;
        let term: Term = resp
            .json()
            .await
            .map_err(|e| AutoblogError::WordPress(format!("failed to parse created term: {e}")))?;
        info!(taxonomy, id = term.id, name = %term.name, "term created");
        Ok(term.id)
    }

    async fn fetch_post(&self, post: &PostRef) -> Result<WpPost> {
        match post {
            PostRef::Id(id) => self.get_json(&format!("posts/{id}"), &[], "post").await,
            PostRef::Slug(slug) => {
                let posts: Vec<WpPost> = self.get_json("posts", &[("slug", slug.as_str())], "post").await?;
                posts
                    .into_iter()
                    .next()
                    .ok_or_else(|| AutoblogError::NotFound(format!("no post with slug \"{slug}\"")))
            }
        }
    }

    /// Fetch one post and project the requested `fields`.  Fields that were
    /// not requested are left empty.  Term ids are named through the
    /// site's `categories` and `tags`.
    pub async fn post_info(
        &self,
        post: &PostRef,
        fields: &[PostField],
        categories: &Taxonomy,
        tags: &Taxonomy,
    ) -> Result<RelatedArticle> {
        let wp = self.fetch_post(post).await?;
        let mut info = RelatedArticle::default();

        let title = html_text(&wp.title.rendered);
        if fields.contains(&PostField::Title) {
            info.title = title.clone();
        }
        if fields.contains(&PostField::FirstParagraphs) {
            info.excerpt = first_paragraphs(&wp.content.rendered, &title, 2);
        }
        if fields.contains(&PostField::Categories) {
            info.categories = resolve_names(categories, &wp.categories);
        }
        if fields.contains(&PostField::Tags) {
            info.tags = resolve_names(tags, &wp.tags);
        }
        if fields.contains(&PostField::Url) {
            info.url = wp.link;
        }
        Ok(info)
    }

    /// Summaries of existing posts offered as internal links.
    pub async fn related_articles(
        &self,
        refs: &[PostRef],
        categories: &Taxonomy,
        tags: &Taxonomy,
    ) -> Result<Vec<RelatedArticle>> {
        let mut related = Vec::with_capacity(refs.len());
        for post in refs {
            let info = self
                .post_info(post, PostField::ALL, categories, tags)
                .await
                .map_err(|e| match e {
                    AutoblogError::NotFound(msg) => {
                        AutoblogError::NotFound(format!("related article {post}: {msg}"))
                    }
                    other => other,
                })?;
            debug!(post = %post, title = %info.title, "related article resolved");
            related.push(info);
        }
        Ok(related)
    }

    /// Upload a file to the media library.
    pub async fn upload_media(&self, bytes: Vec<u8>, filename: &str, mime: &str) -> Result<Media> {
        let req = self
            .client
            .post(self.url("media"))
            .header(header::CONTENT_TYPE, mime)
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            )
            .body(bytes);
        let resp = self.send(req, "media upload", StatusCode::CREATED).await?;
        let media: Media = resp
            .json()
            .await
            .map_err(|e| AutoblogError::WordPress(format!("failed to parse media response: {e}")))?;
        info!(id = media.id, url = %media.source_url, "media uploaded");
        Ok(media)
    }

    pub async fn create_post(&self, draft: &PostDraft) -> Result<CreatedPost> {
        let req = self.client.post(self.url("posts")).json(&draft.to_payload());
        let resp = self.send(req, "create post", StatusCode::CREATED).await?;
        let post: CreatedPost = resp
            .json()
            .await
            .map_err(|e| AutoblogError::WordPress(format!("failed to parse created post: {e}")))?;
        info!(id = post.id, link = %post.link, status = %draft.status, "post created");
        Ok(post)
    }
}

async fn check_status(resp: Response, what: &str, expected: StatusCode) -> Result<Response> {
    let status = resp.status();
    if status == expected || (expected == StatusCode::OK && status.is_success()) {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or(body);
    warn!(status = %status, error = %message, what, "WordPress API error");

    if status == StatusCode::NOT_FOUND {
        return Err(AutoblogError::NotFound(format!("{what}: {message}")));
    }
    let message = format!("{what} returned {status}: {message}");
    if is_retryable_status(status) {
        Err(AutoblogError::Transport(message))
    } else {
        Err(AutoblogError::WordPress(message))
    }
}

fn resolve_names(taxonomy: &Taxonomy, ids: &[u64]) -> Vec<String> {
    ids.iter()
        .map(|id| taxonomy.get(id).cloned().unwrap_or_else(|| id.to_string()))
        .collect()
}

/// Plain text of an HTML fragment, entities decoded.
fn html_text(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

/// The first `n` non-empty paragraphs of rendered content, joined with a
/// space.  A leading paragraph repeating the title is skipped.
fn first_paragraphs(content_html: &str, title: &str, n: usize) -> String {
    let fragment = Html::parse_fragment(content_html);
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };
    let mut blocks: Vec<String> = fragment
        .select(&selector)
        .map(|el| {
            el.text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
        .collect();
    if blocks.first().is_some_and(|first| first == title) {
        blocks.remove(0);
    }
    blocks.truncate(n);
    blocks.join(" ")
}
