//! End-to-end run for one keyword: gather context, generate or resume the
//! article, optimize it, resolve images and publish a draft.

use std::sync::Arc;

use tracing::{info, warn};

use crate::article::{
    ArticleSession, ArticleStore, ConversationState, GenerationContext, RepairOutcome,
    StructuredRecord,
};
use crate::config::Config;
use crate::error::{AutoblogError, Result};
use crate::images::{ImageGenerator, ImageResolver, ImageSearch, OpenAiImages};
use crate::llm::LlmEngine;
use crate::optimize::{ConvergenceLoop, LoopState};
use crate::research::Researcher;
use crate::retry::RetryPolicy;
use crate::seo::NodeScorer;
use crate::wordpress::payload::missing_terms;
use crate::wordpress::{CreatedPost, PostDraft, PostRef, Taxonomy, WordPressClient};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub publish: bool,
    pub optimize: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            publish: true,
            optimize: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub keyword: String,
    /// Whether the article was generated in this run rather than loaded.
    pub generated: bool,
    pub loop_state: Option<LoopState>,
    pub iterations: usize,
    pub remaining_findings: usize,
    pub post: Option<CreatedPost>,
}

pub struct Workflow {
    config: Config,
    options: RunOptions,
}

impl Workflow {
    pub fn new(config: Config, options: RunOptions) -> Self {
        Self { config, options }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let config = &self.config;
        config.validate()?;
        let keyword = config.keyword.trim();
        let retry = RetryPolicy::from_config(&config.retry);

        let wp = WordPressClient::new(&config.wordpress)?.with_retry(retry);
        let categories = wp.categories().await?;
        let tags = wp.tags().await?;
        info!(categories = categories.len(), tags = tags.len(), "taxonomy fetched");

        let refs: Vec<PostRef> = config
            .related_articles
            .iter()
            .map(|r| PostRef::parse(r))
            .collect();
        let related = wp.related_articles(&refs, &categories, &tags).await?;

        let engine = LlmEngine::new(config)?;
        info!(backend = engine.backend_info(), "generation backend ready");
        let store = ArticleStore::new(config.output_dir());

        let mut context = GenerationContext::new(keyword, &config.locale)
            .with_taxonomy(
                categories.values().cloned().collect(),
                tags.values().cloned().collect(),
            )
            .with_related(related);

        let stored = store.load(keyword)?;
        let generated = stored.is_none();
        let (mut document, mut record, mut state) = match stored {
            Some(stored) => {
                info!(keyword, "resuming stored article");
                let state = ConversationState::resume(&stored.record);
                (stored.document, stored.record, state)
            }
            None => {
                if config.research.enabled {
                    let research = Researcher::new(&config.research)?
                        .with_retry(retry)
                        .gather(keyword)
                        .await?;
                    context = context.with_research(research);
                }
                let session = ArticleSession::new(&engine, &context)
                    .with_repair_attempts(config.optimize.repair_attempts);
                let mut state = ConversationState::new();
                let draft = session.generate_full(&mut state).await?;
                store.save(keyword, &draft.document, &draft.record)?;
                if let RepairOutcome::DefaultFilled { unresolved } = &draft.outcome {
                    warn!(
                        keyword,
                        unresolved = ?unresolved,
                        "structured data was default-filled; review FAQs and sources before publishing"
                    );
                }
                info!(keyword, outcome = ?draft.outcome, "article generated");
                (draft.document, draft.record, state)
            }
        };

        let mut report = RunReport {
            keyword: keyword.to_string(),
            generated,
            loop_state: None,
            iterations: 0,
            remaining_findings: 0,
            post: None,
        };

        if self.options.optimize && config.optimize.enabled {
            let session = ArticleSession::new(&engine, &context)
                .with_repair_attempts(config.optimize.repair_attempts);
            let scorer = Arc::new(NodeScorer::new(&config.scorer));
            let outcome = ConvergenceLoop::new(scorer, config)
                .run(&session, &mut state, keyword, document, record, Some(&store))
                .await?;
            report.loop_state = Some(outcome.state);
            report.iterations = outcome.iterations;
            report.remaining_findings = outcome.remaining.len();
            document = outcome.document;
            record = outcome.record;
        }

        if !self.options.publish {
            info!(keyword, "publishing disabled, article kept on disk");
            return Ok(report);
        }

        if config.images.enabled {
            let generator: Box<dyn ImageGenerator> = match config.images.source.as_str() {
                "generate" => {
                    Box::new(OpenAiImages::new(&config.llm, &config.images)?.with_retry(retry))
                }
                "search" => Box::new(
                    ImageSearch::new(&config.research, &config.images)?.with_retry(retry),
                ),
                other => {
                    return Err(AutoblogError::Config(format!(
                        "unknown image source \"{other}\" — available: [generate, search]"
                    )));
                }
            };
            let resolver = ImageResolver::new(generator.as_ref(), &wp, config.images.batch_size);
            document = place_images(&resolver, &store, keyword, &document, &record).await?;
        }

        let tags = self.ensure_tags(&wp, tags, &record).await;
        let draft = PostDraft::from_record(
            keyword,
            &document,
            &record,
            &categories,
            &tags,
            &config.wordpress.post_status,
        );
        report.post = Some(wp.create_post(&draft).await?);
        Ok(report)
    }

    /// Create tags the model chose that the site does not have yet.  A tag
    /// that cannot be created is left off the post.
    async fn ensure_tags(
        &self,
        wp: &WordPressClient,
        mut tags: Taxonomy,
        record: &StructuredRecord,
    ) -> Taxonomy {
        for name in missing_terms(&tags, &record.tags) {
            match wp.create_term("tags", name).await {
                Ok(id) => {
                    tags.insert(id, name.to_string());
                }
                Err(e) => warn!(tag = name, error = %e, "failed to create tag"),
            }
        }
        tags
    }
}

/// Resolve image placeholders and persist the result, so a run that fails
/// later resumes with the uploaded figures instead of producing them again.
async fn place_images(
    resolver: &ImageResolver<'_>,
    store: &ArticleStore,
    keyword: &str,
    document: &str,
    record: &StructuredRecord,
) -> Result<String> {
    let placed = resolver.resolve(document, &record.slug).await;
    if placed != document {
        store.save(keyword, &placed, record)?;
    }
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{GeneratedImage, MediaUploader};
    use crate::wordpress::Media;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct PngGenerator;

    #[async_trait::async_trait]
    impl ImageGenerator for PngGenerator {
        async fn generate(&self, _query: &str) -> Result<GeneratedImage> {
            Ok(GeneratedImage {
                bytes: b"\x89PNG".to_vec(),
                extension: "png",
            })
        }
    }

    #[derive(Default)]
    struct CountingUploader {
        uploads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MediaUploader for CountingUploader {
        async fn upload(&self, _bytes: Vec<u8>, filename: &str, _mime: &str) -> Result<Media> {
            let id = self.uploads.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            Ok(Media {
                id,
                source_url: format!("https://blog.example/uploads/{filename}"),
            })
        }
    }

    fn record() -> StructuredRecord {
        StructuredRecord {
            title: "Cold".into(),
            slug: "common-cold".into(),
            conversation_id: "conv_1".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn placed_images_are_persisted_for_the_next_run() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path());
        let document = "<div><p>Intro</p><!-- image: runny nose --></div>";
        store.save("kw", document, &record()).unwrap();

        let generator = PngGenerator;
        let uploader = CountingUploader::default();
        let resolver = ImageResolver::new(&generator, &uploader, 2);
        let placed = place_images(&resolver, &store, "kw", document, &record())
            .await
            .unwrap();
        assert!(placed.contains("https://blog.example/uploads/common-cold-1.png"));

        let stored = store.load("kw").unwrap().unwrap();
        assert_eq!(stored.document, placed);
        assert_eq!(stored.record.conversation_id, "conv_1");

        let again = place_images(&resolver, &store, "kw", &stored.document, &stored.record)
            .await
            .unwrap();
        assert_eq!(again, placed);
        assert_eq!(uploader.uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_settings_fail_before_any_request() {
        let workflow = Workflow::new(Config::default(), RunOptions::default());
        let err = workflow.run().await.unwrap_err();
        match err {
            AutoblogError::Config(msg) => {
                assert!(msg.contains("OPENAI_API_KEY"));
                assert!(msg.contains("KEYPHRASE"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn default_options_publish_and_optimize() {
        let opts = RunOptions::default();
        assert!(opts.publish && opts.optimize);
    }
}
