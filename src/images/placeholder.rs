use crate::wordpress::payload::escape_html;

const OPEN: &str = "<!--";
const CLOSE: &str = "-->";
const LABEL: &str = "image:";

/// An `<!-- image: query -->` marker in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte range of the whole comment.
    pub start: usize,
    pub end: usize,
    pub query: String,
}

/// Every image placeholder in `document`, in order.  Comments with an
/// empty query are ignored.
pub fn find_placeholders(document: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = document[cursor..].find(OPEN) {
        let start = cursor + rel;
        let inner_start = start + OPEN.len();
        let Some(close_rel) = document[inner_start..].find(CLOSE) else {
            break;
        };
        let inner_end = inner_start + close_rel;
        let end = inner_end + CLOSE.len();

        let inner = document[inner_start..inner_end].trim();
        if let Some(query) = strip_label(inner) {
            if !query.is_empty() {
                found.push(Placeholder {
                    start,
                    end,
                    query: query.to_string(),
                });
            }
        }
        cursor = end;
    }
    found
}

fn strip_label(inner: &str) -> Option<&str> {
    let head = inner.get(..LABEL.len())?;
    if head.eq_ignore_ascii_case(LABEL) {
        Some(inner[LABEL.len()..].trim())
    } else {
        None
    }
}

/// Replace placeholders with their rendered markup.  `None` removes the
/// placeholder.  `placeholders` must come from [`find_placeholders`] on the
/// same document.
pub fn replace_placeholders(document: &str, resolved: &[(Placeholder, Option<String>)]) -> String {
    let mut out = String::with_capacity(document.len());
    let mut cursor = 0;
    for (placeholder, markup) in resolved {
        if placeholder.start < cursor || placeholder.end > document.len() {
            continue;
        }
        out.push_str(&document[cursor..placeholder.start]);
        if let Some(markup) = markup {
            out.push_str(markup);
        }
        cursor = placeholder.end;
    }
    out.push_str(&document[cursor..]);
    out
}

pub fn figure_html(url: &str, alt: &str) -> String {
    format!(
        r#"<figure><img src="{}" alt="{}"></figure>"#,
        escape_html(url),
        escape_html(alt)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<div><p>intro</p><!-- image: سرما خوردگی کودکان --><h2>a</h2><!-- note --><!--IMAGE:cold remedies--><!-- image:   --></div>";

    #[test]
    fn placeholders_are_found_in_order() {
        let found = find_placeholders(DOC);
        let queries: Vec<&str> = found.iter().map(|p| p.query.as_str()).collect();
        assert_eq!(queries, vec!["سرما خوردگی کودکان", "cold remedies"]);
        assert!(DOC[found[0].start..found[0].end].starts_with("<!-- image:"));
    }

    #[test]
    fn replaced_or_removed() {
        let found = find_placeholders(DOC);
        let resolved = vec![
            (found[0].clone(), Some(figure_html("https://x/a.png", "alt \"q\""))),
            (found[1].clone(), None),
        ];
        let out = replace_placeholders(DOC, &resolved);
        assert!(out.contains(r#"<figure><img src="https://x/a.png" alt="alt &quot;q&quot;"></figure><h2>a</h2>"#));
        assert!(!out.contains("cold remedies"));
        assert!(out.contains("<!-- note -->"));
    }

    #[test]
    fn unterminated_comment_stops_scan() {
        assert!(find_placeholders("<p>x</p><!-- image: a").is_empty());
    }
}
