use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::article::schema::{Faq, Source, StructuredRecord};

/// Taxonomy term id → name.
pub type Taxonomy = BTreeMap<u64, String>;

/// Everything needed to create one post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub keyword: String,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub meta: String,
    pub faqs: Vec<Faq>,
    pub sources: Vec<Source>,
    pub category_ids: Vec<u64>,
    pub tag_ids: Vec<u64>,
    pub synonyms: Vec<String>,
    pub status: String,
}

impl PostDraft {
    /// Build a draft from a finished article, mapping the record's
    /// category and tag names onto site term ids.  Names the site does not
    /// know are ignored.
    pub fn from_record(
        keyword: &str,
        document: &str,
        record: &StructuredRecord,
        categories: &Taxonomy,
        tags: &Taxonomy,
        status: &str,
    ) -> Self {
        Self {
            keyword: keyword.to_string(),
            title: record.title.clone(),
            content: document.to_string(),
            slug: record.slug.clone(),
            meta: record.meta.clone(),
            faqs: record
                .faqs
                .iter()
                .filter(|f| !f.question.is_empty())
                .cloned()
                .collect(),
            sources: record
                .sources
                .iter()
                .filter(|s| !s.link.is_empty())
                .cloned()
                .collect(),
            category_ids: term_ids(categories, &record.categories),
            tag_ids: term_ids(tags, &record.tags),
            synonyms: record.synonyms.clone(),
            status: status.to_string(),
        }
    }

    /// JSON body for `POST /wp/v2/posts`.
    pub fn to_payload(&self) -> Value {
        let faq_items: Map<String, Value> = self
            .faqs
            .iter()
            .enumerate()
            .map(|(i, faq)| {
                (
                    format!("item-{i}"),
                    json!({"faq_question": faq.question, "faq_answer": faq.answer}),
                )
            })
            .collect();

        let mut payload = json!({
            "title": self.title,
            "content": self.content,
            "slug": self.slug,
            "meta": {
                "faq_items_v2": faq_items,
                "article_sources": sources_html(&self.sources),
            },
            "categories": self.category_ids,
            "tags": self.tag_ids,
            "yoast_title": self.title,
            "yoast_description": self.meta,
            "yoast_keyword": self.keyword,
        });
        if !self.synonyms.is_empty() {
            payload["yoast_synonyms"] = json!(self.synonyms.join(", "));
        }
        if !self.status.is_empty() {
            payload["status"] = json!(self.status);
        }
        payload
    }
}

/// Ids of the `names` present in `taxonomy`, in taxonomy order.
pub fn term_ids(taxonomy: &Taxonomy, names: &[String]) -> Vec<u64> {
    taxonomy
        .iter()
        .filter(|(_, name)| names.contains(name))
        .map(|(id, _)| *id)
        .collect()
}

/// `names` the taxonomy has no term for.
pub fn missing_terms<'a>(taxonomy: &Taxonomy, names: &'a [String]) -> Vec<&'a str> {
    names
        .iter()
        .filter(|n| !n.trim().is_empty() && !taxonomy.values().any(|v| v == *n))
        .map(String::as_str)
        .collect()
}

/// Source citations as an HTML list; empty when there are none.
pub fn sources_html(sources: &[Source]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let items: String = sources
        .iter()
        .map(|s| {
            format!(
                r#"<li><a href="{}">{}</a></li>"#,
                escape_html(&s.link),
                escape_html(&s.title)
            )
        })
        .collect();
    format!("<ul>{items}</ul>")
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy(pairs: &[(u64, &str)]) -> Taxonomy {
        pairs.iter().map(|(id, n)| (*id, n.to_string())).collect()
    }

    fn record() -> StructuredRecord {
        StructuredRecord {
            title: "سرماخوردگی".into(),
            slug: "common-cold".into(),
            categories: vec!["سلامت".into(), "ناشناخته".into()],
            tags: vec!["بیماری".into(), "زمستان".into()],
            faqs: vec![
                Faq {
                    question: "چرا؟".into(),
                    answer: "چون".into(),
                },
                Faq::default(),
            ],
            meta: "meta".into(),
            sources: vec![Source {
                title: "WHO & CDC".into(),
                link: "https://who.int".into(),
            }],
            synonyms: vec!["زکام".into()],
            ..Default::default()
        }
    }

    #[test]
    fn names_map_to_known_ids_only() {
        let cats = taxonomy(&[(3, "سلامت"), (4, "ورزش")]);
        let tags = taxonomy(&[(10, "زمستان"), (11, "بیماری")]);
        let draft = PostDraft::from_record("سرما خوردگی", "<div/>", &record(), &cats, &tags, "draft");
        assert_eq!(draft.category_ids, vec![3]);
        assert_eq!(draft.tag_ids, vec![10, 11]);
        assert_eq!(draft.faqs.len(), 1);
    }

    #[test]
    fn payload_shape() {
        let draft = PostDraft::from_record(
            "سرما خوردگی",
            "<div/>",
            &record(),
            &Taxonomy::new(),
            &Taxonomy::new(),
            "draft",
        );
        let p = draft.to_payload();
        assert_eq!(p["status"], "draft");
        assert_eq!(p["slug"], "common-cold");
        assert_eq!(p["meta"]["faq_items_v2"]["item-0"]["faq_question"], "چرا؟");
        assert_eq!(p["meta"]["faq_items_v2"]["item-0"]["faq_answer"], "چون");
        assert_eq!(
            p["meta"]["article_sources"],
            r#"<ul><li><a href="https://who.int">WHO &amp; CDC</a></li></ul>"#
        );
        assert_eq!(p["yoast_keyword"], "سرما خوردگی");
        assert_eq!(p["yoast_title"], "سرماخوردگی");
        assert_eq!(p["yoast_description"], "meta");
        assert_eq!(p["yoast_synonyms"], "زکام");
        assert_eq!(p["categories"], json!([]));
    }

    #[test]
    fn empty_sources_render_nothing() {
        assert_eq!(sources_html(&[]), "");
    }

    #[test]
    fn missing_terms_are_reported() {
        let tags = taxonomy(&[(1, "a")]);
        let names = vec!["a".to_string(), "b".to_string(), " ".to_string()];
        assert_eq!(missing_terms(&tags, &names), vec!["b"]);
    }
}
