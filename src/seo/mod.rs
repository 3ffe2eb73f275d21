pub mod node;
pub mod spans;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

pub use node::NodeScorer;
pub use spans::ProblemSpan;

/// Finding identifier the scorer reports in aggregate for the whole
/// document rather than per heading.
pub const SUBHEADING_KEYWORD_ID: &str = "subheadingsKeyword";

// -- Scorer boundary --------------------------------------------------------

/// Everything the scorer needs to assess one article.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub keyword: String,
    /// Comma-separated secondary keyphrases.
    pub synonyms: String,
    pub title: String,
    pub meta_description: String,
    pub slug: String,
    pub text: String,
    pub locale: String,
    pub permalink: String,
}

/// Raw scorer output: result group name → findings.
pub type RawAnalysis = BTreeMap<String, Vec<RawFinding>>;

/// Synchronous SEO scoring capability.  Implementations may block; callers
/// in async context must move the call off the scheduler thread.
pub trait SeoScorer: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, request: &AnalysisRequest) -> Result<RawAnalysis>;
}

// -- Findings ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Good,
    Ok,
    Bad,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFinding {
    #[serde(rename = "_identifier", default)]
    pub identifier: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rating: Rating,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub marks: Option<Vec<Mark>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mark {
    #[serde(rename = "_properties", default)]
    pub properties: MarkProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkProperties {
    #[serde(default)]
    pub position: Option<MarkPosition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPosition {
    #[serde(default)]
    pub start_offset: Option<usize>,
    #[serde(default)]
    pub end_offset: Option<usize>,
}

impl RawFinding {
    fn ranges(&self) -> Vec<(Option<usize>, Option<usize>)> {
        self.marks
            .iter()
            .flatten()
            .map(|m| match &m.properties.position {
                Some(p) => (p.start_offset, p.end_offset),
                None => (None, None),
            })
            .collect()
    }
}

/// An actionable finding with the document spans it points at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeoFinding {
    pub identifier: String,
    pub group: String,
    pub text: String,
    pub rating: Rating,
    pub score: f64,
    pub spans: Vec<ProblemSpan>,
}

/// Drop good and suppressed findings, then attach problem spans.
///
/// `suppressed` matches either a finding identifier or a whole result
/// group.  Spans are deduplicated per finding.
pub fn filter_findings(raw: RawAnalysis, suppressed: &[String], document: &str) -> Vec<SeoFinding> {
    let mut findings = Vec::new();

    for (group, items) in raw {
        if suppressed.contains(&group) {
            continue;
        }
        for item in items {
            if item.rating == Rating::Good || suppressed.contains(&item.identifier) {
                continue;
            }

            let located = if item.identifier == SUBHEADING_KEYWORD_ID {
                spans::subheadings(document)
            } else {
                spans::locate(document, &item.ranges())
            };
            let mut unique: Vec<ProblemSpan> = Vec::with_capacity(located.len());
            for span in located {
                if !unique.contains(&span) {
                    unique.push(span);
                }
            }

            findings.push(SeoFinding {
                identifier: item.identifier,
                group: group.clone(),
                text: item.text,
                rating: item.rating,
                score: item.score,
                spans: unique,
            });
        }
    }

    debug!(remaining = findings.len(), "scorer findings filtered");
    findings
}
