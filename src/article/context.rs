use serde::{Deserialize, Serialize};

/// An existing post offered as an internal-link target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedArticle {
    pub title: String,
    pub url: String,
    /// First paragraphs of the post, plain text.
    pub excerpt: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// Summary of one competing page ranking for the keyword.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitorSummary {
    pub url: String,
    pub title: String,
    pub headings: Vec<String>,
    pub word_count: usize,
    pub heading_count: usize,
    pub image_count: usize,
    pub link_count: usize,
    pub audio_count: usize,
    pub video_count: usize,
    pub body_excerpt: String,
}

/// Per-run inputs of one article.  Built once, read by every prompt.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub keyword: String,
    pub locale: String,
    /// Category names offered to the model.
    pub categories: Vec<String>,
    /// Tag names offered to the model.
    pub tags: Vec<String>,
    pub related: Vec<RelatedArticle>,
    pub research: Vec<CompetitorSummary>,
}

impl GenerationContext {
    pub fn new(keyword: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            locale: locale.into(),
            ..Default::default()
        }
    }

    pub fn with_taxonomy(mut self, categories: Vec<String>, tags: Vec<String>) -> Self {
        self.categories = categories;
        self.tags = tags;
        self
    }

    pub fn with_related(mut self, related: Vec<RelatedArticle>) -> Self {
        self.related = related;
        self
    }

    pub fn with_research(mut self, research: Vec<CompetitorSummary>) -> Self {
        self.research = research;
        self
    }
}
