//! Shape checks for the structured metadata the model returns after the
//! article body.
//!
//! The model's JSON is untrusted: [`validate`] itemizes every structural
//! defect, [`fill_defaults`] patches whatever is still broken once the repair
//! budget is spent, and [`StructuredRecord::from_payload`] is the only way a
//! payload becomes a typed record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Result;

/// Key under which the conversation id is stamped into every payload.
pub const CONVERSATION_ID_KEY: &str = "conversation_id";

/// Expected JSON shape of one schema key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextList,
    /// List of `{question, answer}` string pairs.
    FaqList,
    /// List of `{title, link}` string pairs.
    SourceList,
}

impl FieldKind {
    fn describe(self) -> &'static str {
        match self {
            FieldKind::Text => "a string",
            FieldKind::TextList | FieldKind::FaqList | FieldKind::SourceList => "a list",
        }
    }

    fn pair_keys(self) -> Option<(&'static str, &'static str)> {
        match self {
            FieldKind::FaqList => Some(("question", "answer")),
            FieldKind::SourceList => Some(("title", "link")),
            _ => None,
        }
    }

    /// Typed empty value used when the model never produced the key.
    pub fn empty_value(self) -> Value {
        match self {
            FieldKind::Text => Value::String(String::new()),
            FieldKind::TextList => Value::Array(Vec::new()),
            FieldKind::FaqList => json!([{ "question": "", "answer": "" }]),
            FieldKind::SourceList => json!([{ "title": "", "link": "" }]),
        }
    }
}

/// Keys every payload must carry, in the order defects are reported.
pub const REQUIRED_FIELDS: &[(&str, FieldKind)] = &[
    ("title", FieldKind::Text),
    ("slug", FieldKind::Text),
    ("categories", FieldKind::TextList),
    ("tags", FieldKind::TextList),
    ("faqs", FieldKind::FaqList),
    ("meta", FieldKind::Text),
    ("sources", FieldKind::SourceList),
];

/// Keys that may be absent.  Present-but-mistyped values are dropped by
/// [`fill_defaults`] rather than reported.
pub const OPTIONAL_FIELDS: &[(&str, FieldKind)] = &[
    ("synonyms", FieldKind::TextList),
    (CONVERSATION_ID_KEY, FieldKind::Text),
];

/// Itemize every structural defect of `payload`.  Empty iff conformant.
pub fn validate(payload: &Map<String, Value>) -> Vec<String> {
    let mut defects = Vec::new();

    for &(key, kind) in REQUIRED_FIELDS {
        let Some(value) = payload.get(key) else {
            defects.push(format!("missing required key `{key}`"));
            continue;
        };

        match (kind, value) {
            (FieldKind::Text, Value::String(_)) => {}
            (FieldKind::TextList, Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        defects.push(format!("`{key}[{}]` must be a string", i + 1));
                    }
                }
            }
            (FieldKind::FaqList | FieldKind::SourceList, Value::Array(items)) => {
                let (a, b) = kind.pair_keys().unwrap_or_default();
                for (i, item) in items.iter().enumerate() {
                    if !is_string_pair(item, a, b) {
                        defects.push(format!(
                            "`{key}` item {} must be an object with string `{a}` and `{b}`",
                            i + 1
                        ));
                    }
                }
            }
            _ => defects.push(format!("`{key}` must be {}", kind.describe())),
        }
    }

    defects
}

/// Keys named by `defects`, deduplicated, in schema order.
pub fn defective_keys(payload: &Map<String, Value>) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .filter(|(key, kind)| !field_ok(payload.get(*key), *kind))
        .map(|(key, _)| *key)
        .collect()
}

/// Patch `payload` so that every required key exists with the right type.
///
/// Missing or mistyped keys get [`FieldKind::empty_value`]; malformed list
/// elements are dropped; mistyped optional keys are removed.
pub fn fill_defaults(payload: &mut Map<String, Value>) {
    for &(key, kind) in REQUIRED_FIELDS {
        sanitize(payload, key, kind, true);
    }
    for &(key, kind) in OPTIONAL_FIELDS {
        sanitize(payload, key, kind, false);
    }
}

fn sanitize(payload: &mut Map<String, Value>, key: &str, kind: FieldKind, required: bool) {
    let present_with_type = match (kind, payload.get(key)) {
        (FieldKind::Text, Some(Value::String(_))) => true,
        (_, Some(Value::Array(_))) if kind != FieldKind::Text => true,
        _ => false,
    };

    if !present_with_type {
        if required {
            payload.insert(key.to_string(), kind.empty_value());
        } else {
            payload.remove(key);
        }
        return;
    }

    if let Some(Value::Array(items)) = payload.get_mut(key) {
        match kind.pair_keys() {
            Some((a, b)) => items.retain(|item| is_string_pair(item, a, b)),
            None => items.retain(Value::is_string),
        }
    }
}

fn field_ok(value: Option<&Value>, kind: FieldKind) -> bool {
    match (kind, value) {
        (FieldKind::Text, Some(Value::String(_))) => true,
        (FieldKind::TextList, Some(Value::Array(items))) => items.iter().all(Value::is_string),
        (FieldKind::FaqList | FieldKind::SourceList, Some(Value::Array(items))) => {
            let (a, b) = kind.pair_keys().unwrap_or_default();
            items.iter().all(|item| is_string_pair(item, a, b))
        }
        _ => false,
    }
}

fn is_string_pair(item: &Value, a: &str, b: &str) -> bool {
    item.as_object().is_some_and(|obj| {
        obj.get(a).is_some_and(Value::is_string) && obj.get(b).is_some_and(Value::is_string)
    })
}

// -- Typed record ----------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub link: String,
}

/// Validated article metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub title: String,
    pub slug: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub faqs: Vec<Faq>,
    pub meta: String,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub conversation_id: String,
}

impl StructuredRecord {
    /// Convert a payload into a record, filling anything still defective.
    pub fn from_payload(mut payload: Map<String, Value>) -> Result<Self> {
        fill_defaults(&mut payload);
        Ok(serde_json::from_value(Value::Object(payload))?)
    }

    /// Soft content expectations that never block the run.  Returned as
    /// notes for the log.
    pub fn quality_notes(&self, keyword: &str, offered_categories: &[String]) -> Vec<String> {
        let mut notes = Vec::new();
        if self.tags.len() != 5 {
            notes.push(format!("expected 5 tags, got {}", self.tags.len()));
        }
        if self.faqs.len() != 3 {
            notes.push(format!("expected 3 FAQs, got {}", self.faqs.len()));
        }
        let meta_len = self.meta.chars().count();
        if meta_len > 160 {
            notes.push(format!("meta description is {meta_len} characters (max 160)"));
        }
        if !keyword.is_empty() && !self.meta.contains(keyword) {
            notes.push("meta description does not contain the keyword".into());
        }
        for category in &self.categories {
            if !offered_categories.contains(category) {
                notes.push(format!("category `{category}` was not offered"));
            }
        }
        notes
    }
}
