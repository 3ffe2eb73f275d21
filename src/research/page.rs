use scraper::{ElementRef, Html, Selector};

use crate::article::CompetitorSummary;

/// Pages with more than this share of U+FFFD are treated as mis-decoded.
const MAX_REPLACEMENT_RATIO: f64 = 0.01;

/// Containers tried in order for the main content; the first with a
/// reasonable amount of text wins, otherwise `body`.
const CONTENT_SELECTORS: &[&str] = &["article", "main", "#content", ".content", ".post", "#main"];
const MIN_CONTENT_WORDS: usize = 100;

/// Strip control characters (keeping tab/newline/CR) and reject garbled
/// pages.  `None` means the page should be skipped.
pub fn clean(html: &str) -> Option<String> {
    let cleaned: String = html
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    let total = cleaned.chars().count();
    if total == 0 {
        return None;
    }
    let replaced = cleaned.chars().filter(|&c| c == '\u{FFFD}').count();
    if replaced as f64 / total as f64 > MAX_REPLACEMENT_RATIO {
        return None;
    }
    Some(cleaned)
}

/// Summarize one competing page: title, headings and element counts of its
/// main content, plus a text excerpt of at most `excerpt_chars` characters.
pub fn summarize(url: &str, html: &str, excerpt_chars: usize) -> CompetitorSummary {
    let document = Html::parse_document(html);

    let content = main_content(&document);
    let title = first_text(&document, "title")
        .or_else(|| first_text(&document, "h1"))
        .unwrap_or_default();

    let (headings, word_count, image_count, link_count, audio_count, video_count, text) =
        match content {
            Some(root) => (
                texts(root, "h1, h2, h3"),
                words(root),
                count(root, "img"),
                count(root, "a"),
                count(root, "audio"),
                count(root, "video, iframe"),
                plain_text(root),
            ),
            None => (Vec::new(), 0, 0, 0, 0, 0, String::new()),
        };

    CompetitorSummary {
        url: url.to_string(),
        title,
        heading_count: headings.len(),
        headings,
        word_count,
        image_count,
        link_count,
        audio_count,
        video_count,
        body_excerpt: truncate(&text, excerpt_chars),
    }
}

fn main_content(document: &Html) -> Option<ElementRef<'_>> {
    for css in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(el) = document.select(&selector).next() {
            if words(el) >= MIN_CONTENT_WORDS {
                return Some(el);
            }
        }
    }
    let body = Selector::parse("body").ok()?;
    document.select(&body).next()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(|el| collapse(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn texts(root: ElementRef<'_>, css: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(css) else {
        return Vec::new();
    };
    root.select(&selector)
        .map(|el| collapse(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect()
}

fn count(root: ElementRef<'_>, css: &str) -> usize {
    Selector::parse(css)
        .map(|selector| root.select(&selector).count())
        .unwrap_or(0)
}

fn words(root: ElementRef<'_>) -> usize {
    plain_text(root).split_whitespace().count()
}

/// Visible text, skipping script-like and navigation elements.
fn plain_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(root, &mut out);
    collapse(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for node in element.children() {
        if let Some(el) = ElementRef::wrap(node) {
            if matches!(
                el.value().name(),
                "script" | "style" | "noscript" | "nav" | "footer" | "header" | "aside" | "form"
            ) {
                continue;
            }
            collect_text(el, out);
            out.push(' ');
        } else if let Some(text) = node.value().as_text() {
            out.push_str(text);
        }
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
            <head><title>Common cold guide</title><script>var x = 1;</script></head>
            <body>
                <nav><a href="/">Home</a></nav>
                <h1>Common cold</h1>
                <h2>Symptoms</h2>
                <p>Runny nose and <a href="/sneeze">sneezing</a>.</p>
                <img src="a.png">
                <h3>In children</h3>
                <video src="v.mp4"></video>
                <iframe src="https://video.example"></iframe>
                <audio src="a.mp3"></audio>
                <footer>Copyright</footer>
            </body>
        </html>
    "#;

    #[test]
    fn summary_counts_body_elements() {
        let s = summarize("https://x.example", PAGE, 4000);
        assert_eq!(s.title, "Common cold guide");
        assert_eq!(s.headings, vec!["Common cold", "Symptoms", "In children"]);
        assert_eq!(s.heading_count, 3);
        assert_eq!(s.image_count, 1);
        // nav link included: counts cover the whole container
        assert_eq!(s.link_count, 2);
        assert_eq!(s.audio_count, 1);
        assert_eq!(s.video_count, 2);
        assert!(s.body_excerpt.contains("Runny nose and sneezing"));
        assert!(!s.body_excerpt.contains("var x"));
        assert!(!s.body_excerpt.contains("Copyright"));
    }

    #[test]
    fn article_container_is_preferred_when_substantial() {
        let body = "word ".repeat(120);
        let html = format!(
            "<html><body><div><h2>Sidebar</h2></div><article><h2>Main</h2><p>{body}</p></article></body></html>"
        );
        let s = summarize("u", &html, 4000);
        assert_eq!(s.headings, vec!["Main"]);
        assert_eq!(s.word_count, 121);
    }

    #[test]
    fn excerpt_is_truncated_on_char_boundary() {
        let html = "<html><body><p>سرماخوردگی یک بیماری شایع است</p></body></html>";
        let s = summarize("u", html, 5);
        assert_eq!(s.body_excerpt, "سرماخ…");
    }

    #[test]
    fn control_characters_are_stripped() {
        assert_eq!(clean("a\u{0}b\u{7}c\nd").as_deref(), Some("abc\nd"));
    }

    #[test]
    fn garbled_pages_are_rejected() {
        let garbled = format!("{}{}", "a".repeat(90), "\u{FFFD}".repeat(10));
        assert_eq!(clean(&garbled), None);
        let fine = format!("{}\u{FFFD}", "a".repeat(200));
        assert!(clean(&fine).is_some());
        assert_eq!(clean(""), None);
    }
}
