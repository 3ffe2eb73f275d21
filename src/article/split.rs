use serde_json::{Map, Value};
use tracing::debug;

/// A model response separated into the HTML document and the trailing
/// structured-data object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitResponse {
    pub body: String,
    pub payload: Map<String, Value>,
}

/// Split `text` into document body and structured payload.
///
/// The payload is the span from the first `{` to the last `}`; everything
/// before it (minus an opening code fence) is the body.  When that span does
/// not parse, the last complete object that ends the text is tried instead,
/// so literal braces inside the document do not poison the payload.  Never
/// fails: with no braces the whole text is the body, and an unparsable
/// response yields an empty payload.
pub fn split_response(text: &str) -> SplitResponse {
    let Some((start, end)) = object_span(text) else {
        return SplitResponse {
            body: text.trim().to_string(),
            payload: Map::new(),
        };
    };

    let payload = parse_object(&text[start..=end]);
    if !payload.is_empty() {
        return SplitResponse {
            body: strip_open_fence(text[..start].trim()).to_string(),
            payload,
        };
    }

    match trailing_object(text) {
        Some((pos, payload)) => SplitResponse {
            body: strip_open_fence(text[..pos].trim()).to_string(),
            payload,
        },
        None => SplitResponse {
            body: strip_open_fence(text[..start].trim()).to_string(),
            payload: Map::new(),
        },
    }
}

/// Parse only the structured part of a reply (used for fix-request replies,
/// which carry no document).
pub fn extract_payload(text: &str) -> Map<String, Value> {
    split_response(text).payload
}

fn object_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then_some((start, end))
}

fn parse_object(span: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => {
            debug!(error = %e, span_len = span.len(), "structured block is not valid JSON");
            Map::new()
        }
    }
}

/// First `{` that starts a JSON object followed only by whitespace or a
/// closing fence.
fn trailing_object(text: &str) -> Option<(usize, Map<String, Value>)> {
    for (pos, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[pos..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            let rest = text[pos + stream.byte_offset()..].trim().trim_matches('`').trim();
            if rest.is_empty() {
                return Some((pos, map));
            }
        }
    }
    None
}

/// Drop a dangling "```json" line left between the body and the object.
fn strip_open_fence(body: &str) -> &str {
    let Some(pos) = body.rfind("```") else {
        return body;
    };
    let tail = body[pos + 3..].trim();
    if tail.chars().all(|c| c.is_ascii_alphanumeric()) {
        body[..pos].trim_end()
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_and_payload_are_separated() {
        let record = json!({"title": "X", "tags": ["a", "b"], "faqs": [{"question": "q", "answer": "a"}]});
        let body = "<div lang=\"fa\" dir=\"rtl\"><h1>X</h1><p>متن</p></div>";
        let text = format!("  {body}\n{}", serde_json::to_string_pretty(&record).unwrap());

        let split = split_response(&text);
        assert_eq!(split.body, body);
        assert_eq!(Value::Object(split.payload), record);
    }

    #[test]
    fn plain_text_is_all_body() {
        let split = split_response("  plain text, no json \n");
        assert_eq!(split.body, "plain text, no json");
        assert!(split.payload.is_empty());
    }

    #[test]
    fn invalid_json_gives_empty_payload() {
        let split = split_response("<p>a</p>\n{\"title\": \"unterminated}");
        assert_eq!(split.body, "<p>a</p>");
        assert!(split.payload.is_empty());
    }

    #[test]
    fn stray_closing_brace_gives_empty_payload() {
        assert!(extract_payload("{} trailing } brace").is_empty());
    }

    #[test]
    fn fenced_block_is_unwrapped() {
        let text = "<div><p>x</p></div>\n\n```json\n{\"slug\": \"x\"}\n```";
        let split = split_response(text);
        assert_eq!(split.body, "<div><p>x</p></div>");
        assert_eq!(split.payload["slug"], json!("x"));
    }

    #[test]
    fn braces_in_body_fall_back_to_trailing_object() {
        let text = "<p>f(x) = {1, 2}</p>\n{\"slug\": \"x\"}";
        let split = split_response(text);
        assert_eq!(split.body, "<p>f(x) = {1, 2}</p>");
        assert_eq!(split.payload["slug"], json!("x"));
    }

    #[test]
    fn empty_object_is_an_empty_payload() {
        let split = split_response("<p>x</p>\n{}");
        assert_eq!(split.body, "<p>x</p>");
        assert!(split.payload.is_empty());
    }

    #[test]
    fn extract_payload_ignores_surrounding_prose() {
        let payload = extract_payload("Here is the fix:\n```json\n{\"meta\": \"m\"}\n```\nDone.");
        assert_eq!(payload["meta"], json!("m"));
    }
}
