use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::article::schema::StructuredRecord;
use crate::error::{AutoblogError, Result};

/// A document/record pair as it sits on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArticle {
    pub document: String,
    pub record: StructuredRecord,
}

/// Durable storage for article artifacts: `<keyword>.json` holds the record
/// (including the conversation id), `<keyword>.html` the document.
pub struct ArticleStore {
    dir: PathBuf,
}

impl ArticleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn stem(keyword: &str) -> String {
        let stem: String = keyword
            .trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
                c if c.is_control() => '-',
                c => c,
            })
            .collect();
        if stem.is_empty() {
            "article".into()
        } else {
            stem
        }
    }

    pub fn record_path(&self, keyword: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::stem(keyword)))
    }

    pub fn document_path(&self, keyword: &str) -> PathBuf {
        self.dir.join(format!("{}.html", Self::stem(keyword)))
    }

    /// Load a previously saved article.  `None` unless both files exist.
    pub fn load(&self, keyword: &str) -> Result<Option<StoredArticle>> {
        let record_path = self.record_path(keyword);
        let document_path = self.document_path(keyword);
        if !record_path.exists() || !document_path.exists() {
            debug!(keyword, dir = %self.dir.display(), "no stored article");
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&record_path)?;
        let payload: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
            .map_err(|e| {
                AutoblogError::Config(format!(
                    "stored record {} is not a JSON object: {e}",
                    record_path.display()
                ))
            })?;
        let record = StructuredRecord::from_payload(payload)?;
        let document = std::fs::read_to_string(&document_path)?;

        info!(
            keyword,
            conversation_id = %record.conversation_id,
            "loaded stored article"
        );
        Ok(Some(StoredArticle { document, record }))
    }

    /// Write both artifacts.  The last writer wins; a record from a
    /// different conversation is overwritten with a warning.
    pub fn save(&self, keyword: &str, document: &str, record: &StructuredRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let record_path = self.record_path(keyword);
        let previous = std::fs::read_to_string(&record_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|v| v.get("conversation_id")?.as_str().map(str::to_string))
            .unwrap_or_default();
        if !previous.is_empty() && previous != record.conversation_id {
            warn!(
                keyword,
                previous = %previous,
                current = %record.conversation_id,
                "overwriting article saved by another conversation"
            );
        }

        std::fs::write(&record_path, serde_json::to_string_pretty(record)?)?;
        std::fs::write(self.document_path(keyword), document)?;
        debug!(keyword, path = %record_path.display(), "article saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::schema::Faq;
    use tempfile::TempDir;

    fn record(conversation_id: &str) -> StructuredRecord {
        StructuredRecord {
            title: "سرماخوردگی چیست".into(),
            slug: "common-cold".into(),
            faqs: vec![Faq {
                question: "q".into(),
                answer: "a".into(),
            }],
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path());
        assert_eq!(store.load("kw").unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path().join("out"));
        store.save("سرما خوردگی", "<div>x</div>", &record("conv_1")).unwrap();

        let loaded = store.load("سرما خوردگی").unwrap().unwrap();
        assert_eq!(loaded.document, "<div>x</div>");
        assert_eq!(loaded.record, record("conv_1"));
    }

    #[test]
    fn record_keeps_non_ascii_text() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path());
        store.save("kw", "<div/>", &record("c")).unwrap();
        let raw = std::fs::read_to_string(store.record_path("kw")).unwrap();
        assert!(raw.contains("سرماخوردگی چیست"));
        assert!(raw.contains("\"conversation_id\": \"c\""));
    }

    #[test]
    fn half_written_article_is_not_loaded() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path());
        store.save("kw", "<div/>", &record("c")).unwrap();
        std::fs::remove_file(store.document_path("kw")).unwrap();
        assert_eq!(store.load("kw").unwrap(), None);
    }

    #[test]
    fn incomplete_stored_record_is_filled() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path());
        std::fs::write(store.record_path("kw"), r#"{"title": "T"}"#).unwrap();
        std::fs::write(store.document_path("kw"), "<div/>").unwrap();

        let loaded = store.load("kw").unwrap().unwrap();
        assert_eq!(loaded.record.title, "T");
        assert_eq!(loaded.record.faqs, vec![Faq::default()]);
    }

    #[test]
    fn later_save_wins() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path());
        store.save("kw", "<div>1</div>", &record("a")).unwrap();
        store.save("kw", "<div>2</div>", &record("b")).unwrap();
        let loaded = store.load("kw").unwrap().unwrap();
        assert_eq!(loaded.document, "<div>2</div>");
        assert_eq!(loaded.record.conversation_id, "b");
    }

    #[test]
    fn path_separators_are_replaced() {
        let store = ArticleStore::new("/tmp/x");
        assert_eq!(store.record_path("a/b"), PathBuf::from("/tmp/x/a-b.json"));
        assert_eq!(store.document_path("  "), PathBuf::from("/tmp/x/article.html"));
    }
}
