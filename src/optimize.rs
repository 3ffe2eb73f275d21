//! Score → revise convergence loop.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::article::schema::{Faq, Source, StructuredRecord};
use crate::article::{ArticleSession, ArticleStore, ConversationState, Draft};
use crate::config::Config;
use crate::error::{AutoblogError, Result};
use crate::seo::{self, AnalysisRequest, SeoFinding, SeoScorer};

/// Anything that can revise an article in response to scorer findings.
#[async_trait::async_trait]
pub trait Reviser: Send + Sync {
    async fn revise(
        &self,
        state: &mut ConversationState,
        document: &str,
        title: &str,
        findings: &[SeoFinding],
    ) -> Result<Draft>;
}

#[async_trait::async_trait]
impl<'a> Reviser for ArticleSession<'a> {
    async fn revise(
        &self,
        state: &mut ConversationState,
        document: &str,
        title: &str,
        findings: &[SeoFinding],
    ) -> Result<Draft> {
        ArticleSession::revise(self, state, document, title, findings).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Scoring,
    Deciding,
    Revising,
    Converged,
    Exhausted,
}

/// Final document/record pair plus how the loop ended.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// `Converged` or `Exhausted`.
    pub state: LoopState,
    pub iterations: usize,
    pub document: String,
    pub record: StructuredRecord,
    /// Findings from the last scoring pass.
    pub remaining: Vec<SeoFinding>,
}

pub struct ConvergenceLoop {
    scorer: Arc<dyn SeoScorer>,
    suppressed: Vec<String>,
    max_iterations: usize,
    max_problems: usize,
    locale: String,
    site_url: String,
}

impl ConvergenceLoop {
    pub fn new(scorer: Arc<dyn SeoScorer>, config: &Config) -> Self {
        Self {
            scorer,
            suppressed: config.scorer.suppressed.clone(),
            max_iterations: config.optimize.max_iterations,
            max_problems: config.optimize.max_problems,
            locale: config.locale.clone(),
            site_url: config.wordpress.site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Score and revise until few enough findings remain or the iteration
    /// cap is hit.  Every revision is saved to `store` before rescoring.
    pub async fn run(
        &self,
        reviser: &dyn Reviser,
        state: &mut ConversationState,
        keyword: &str,
        document: String,
        record: StructuredRecord,
        store: Option<&ArticleStore>,
    ) -> Result<LoopOutcome> {
        let mut document = document;
        let mut record = record;
        let mut findings = Vec::new();
        let mut iterations = 0;
        let mut current = LoopState::Scoring;

        info!(
            keyword,
            scorer = self.scorer.name(),
            max_iterations = self.max_iterations,
            max_problems = self.max_problems,
            "starting optimization"
        );

        loop {
            current = match current {
                LoopState::Scoring => {
                    findings = self.score(keyword, &document, &record).await;
                    info!(iteration = iterations, findings = findings.len(), "article scored");
                    LoopState::Deciding
                }
                LoopState::Deciding => {
                    if findings.len() <= self.max_problems {
                        LoopState::Converged
                    } else if iterations >= self.max_iterations {
                        LoopState::Exhausted
                    } else {
                        LoopState::Revising
                    }
                }
                LoopState::Revising => {
                    let draft = reviser.revise(state, &document, &record.title, &findings).await?;
                    record = carry_over(draft.record, &record);
                    document = draft.document;
                    iterations += 1;

                    if let Some(store) = store {
                        store.save(keyword, &document, &record)?;
                    }
                    debug!(iteration = iterations, "revision applied");
                    LoopState::Scoring
                }
                done @ (LoopState::Converged | LoopState::Exhausted) => {
                    if done == LoopState::Exhausted {
                        warn!(
                            iterations,
                            remaining = findings.len(),
                            "iteration cap reached with findings outstanding"
                        );
                    } else {
                        info!(iterations, remaining = findings.len(), "article converged");
                    }
                    return Ok(LoopOutcome {
                        state: done,
                        iterations,
                        document,
                        record,
                        remaining: findings,
                    });
                }
            };
        }
    }

    /// One scorer pass.  A failing scorer yields no findings.
    async fn score(&self, keyword: &str, document: &str, record: &StructuredRecord) -> Vec<SeoFinding> {
        let request = AnalysisRequest {
            keyword: keyword.to_string(),
            synonyms: record.synonyms.join(", "),
            title: record.title.clone(),
            meta_description: record.meta.clone(),
            slug: record.slug.clone(),
            text: document.to_string(),
            locale: self.locale.clone(),
            permalink: format!("{}/{}", self.site_url, record.slug),
        };

        let scorer = Arc::clone(&self.scorer);
        let result = tokio::task::spawn_blocking(move || scorer.analyze(&request))
            .await
            .map_err(|e| AutoblogError::Scorer(format!("scorer task failed: {e}")))
            .and_then(|r| r);

        match result {
            Ok(raw) => seo::filter_findings(raw, &self.suppressed, document),
            Err(e) => {
                warn!(error = %e, "scoring failed, treating as no findings");
                Vec::new()
            }
        }
    }
}

/// Keep earlier values for fields a revision came back without.
fn carry_over(mut revised: StructuredRecord, previous: &StructuredRecord) -> StructuredRecord {
    macro_rules! keep_if_empty {
        ($($field:ident),*) => {
            $(
                if revised.$field.is_empty() {
                    revised.$field = previous.$field.clone();
                }
            )*
        };
    }
    keep_if_empty!(title, slug, meta, categories, tags, synonyms, conversation_id);

    if revised.faqs.iter().all(|f| *f == Faq::default()) {
        revised.faqs = previous.faqs.clone();
    }
    if revised.sources.iter().all(|s| *s == Source::default()) {
        revised.sources = previous.sources.clone();
    }
    revised
}
