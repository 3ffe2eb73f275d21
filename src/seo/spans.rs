//! Map scorer offsets back to the structural block (heading, paragraph,
//! list item) of the document that contains them.
//!
//! Offsets are character offsets into the HTML text the scorer was given.

use serde::Serialize;

/// One structural unit of the document implicated by a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSpan {
    /// The block's full markup, opening tag to closing tag.
    pub full_text: String,
    /// First word of the block's text content.
    pub leading_token: String,
}

/// Tags that delimit a block.  Order matters only for readability.
const BLOCK_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "p", "li"];

#[derive(Debug, Clone)]
struct Block<'a> {
    tag: &'static str,
    /// Character range, end exclusive.
    start: usize,
    end: usize,
    markup: &'a str,
}

impl Block<'_> {
    fn len(&self) -> usize {
        self.end - self.start
    }

    /// Inclusive of one character past the end: scorers report end offsets
    /// off by one often enough.
    fn touches(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    fn encloses(&self, start: usize, end: usize) -> bool {
        self.start <= start && end <= self.end + 1
    }

    fn span(&self) -> ProblemSpan {
        ProblemSpan {
            full_text: self.markup.to_string(),
            leading_token: leading_token(self.markup),
        }
    }
}

/// Resolve every `(start, end)` range to its smallest enclosing block.
///
/// Ranges with a missing endpoint are skipped, as are ranges that touch no
/// block.  A block that fully encloses the range wins over one that only
/// contains an endpoint.
pub fn locate(text: &str, ranges: &[(Option<usize>, Option<usize>)]) -> Vec<ProblemSpan> {
    let blocks = blocks(text);
    ranges
        .iter()
        .filter_map(|&(start, end)| {
            let (start, end) = (start?, end?);
            let (start, end) = if start <= end { (start, end) } else { (end, start) };

            smallest(blocks.iter().filter(|b| b.encloses(start, end)))
                .or_else(|| smallest(blocks.iter().filter(|b| b.touches(start) || b.touches(end))))
                .map(Block::span)
        })
        .collect()
}

/// Every level-2/3 heading of the document, in order.  Used for findings the
/// scorer reports in aggregate, such as missing keyword in subheadings.
pub fn subheadings(text: &str) -> Vec<ProblemSpan> {
    blocks(text)
        .iter()
        .filter(|b| matches!(b.tag, "h2" | "h3"))
        .map(Block::span)
        .collect()
}

/// First word of `markup`'s text with tags, leading punctuation or quotes,
/// and trailing sentence punctuation removed.
pub fn leading_token(markup: &str) -> String {
    strip_tags(markup)
        .split_whitespace()
        .map(|word| {
            word.trim_start_matches(|c: char| !c.is_alphanumeric())
                .trim_end_matches(is_trailing_punctuation)
        })
        .find(|word| !word.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Punctuation and quotes that may follow a word.  Combining marks such as
/// tanwin belong to the word and are kept.
fn is_trailing_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c, '«' | '»' | '“' | '”' | '‘' | '’' | '،' | '؛' | '؟' | '…')
}

fn smallest<'a, 'b>(candidates: impl Iterator<Item = &'b Block<'a>>) -> Option<&'b Block<'a>>
where
    'a: 'b,
{
    candidates.min_by_key(|b| b.len())
}

/// Scan `text` at tag-opening boundaries and collect every block with its
/// matching close tag.
fn blocks(text: &str) -> Vec<Block<'_>> {
    let mut out = Vec::new();
    let mut char_pos = 0;
    let mut byte_pos = 0;

    for (open, _) in text.match_indices('<') {
        let Some(tag) = opening_tag(&text[open..]) else {
            continue;
        };
        let close_pat = format!("</{tag}>");
        let Some(close_rel) = find_ascii_ci(&text[open..], &close_pat) else {
            continue;
        };
        let close_end = open + close_rel + close_pat.len();

        char_pos += text[byte_pos..open].chars().count();
        byte_pos = open;
        let len = text[open..close_end].chars().count();

        out.push(Block {
            tag,
            start: char_pos,
            end: char_pos + len,
            markup: &text[open..close_end],
        });
    }

    out
}

/// The block tag opened at the start of `s`, if any.
fn opening_tag(s: &str) -> Option<&'static str> {
    let rest = s.strip_prefix('<')?;
    BLOCK_TAGS.iter().copied().find(|tag| {
        rest.len() > tag.len()
            && rest.as_bytes()[..tag.len()].eq_ignore_ascii_case(tag.as_bytes())
            && matches!(rest.as_bytes()[tag.len()], b'>' | b' ' | b'\t' | b'\n' | b'/')
    })
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Tags that do not break a word when they sit inside it.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "code", "em", "i", "mark", "small", "span", "strong", "sub", "sup", "u",
];

/// Text of `s` without tags.  Block-level tags become a space; inline tags
/// vanish so `A<strong>B</strong>` stays one word.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    let mut tag = String::new();
    for c in s.chars() {
        match c {
            '<' if !in_tag => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if !is_inline_tag(&tag) {
                    out.push(' ');
                }
            }
            _ if in_tag => tag.push(c),
            _ => out.push(c),
        }
    }
    out
}

fn is_inline_tag(tag: &str) -> bool {
    let name = tag
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default();
    INLINE_TAGS.iter().any(|t| t.eq_ignore_ascii_case(name))
}
