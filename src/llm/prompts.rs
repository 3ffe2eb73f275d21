//! Prompt text for every turn of an article conversation.

use serde_json::json;

use crate::article::context::GenerationContext;
use crate::llm::context::Turn;
use crate::seo::SeoFinding;

/// Token that marks the turn allowed to produce the article.
pub const GENERATE_TRIGGER: &str = "[[GENERATE]]";

/// Shape of the structured-data block, shown to the model verbatim.
fn structured_skeleton() -> String {
    let skeleton = json!({
        "title": "string",
        "slug": "string (latin, lowercase, hyphenated)",
        "categories": ["string (only from the allowed list)"],
        "tags": ["string", "string", "string", "string", "string"],
        "faqs": [
            {"question": "string", "answer": "string"},
            {"question": "string", "answer": "string"},
            {"question": "string", "answer": "string"}
        ],
        "meta": "string (at most 160 characters, contains the primary keyword)",
        "sources": [{"title": "string", "link": "https://..."}],
        "synonyms": ["string"]
    });
    serde_json::to_string_pretty(&skeleton).unwrap_or_default()
}

/// The staged context-delivery sequence for a full generation.  Every turn
/// but the last expects a one-word acknowledgment.
pub fn staged_turns(ctx: &GenerationContext) -> Vec<Turn> {
    let mut turns = Vec::new();

    turns.push(Turn::developer(format!(
        "You will receive the inputs for one article over several messages. \
         Do not write any part of the article until a message that starts with {GENERATE_TRIGGER} arrives. \
         Reply to every earlier message with the single word: OK"
    )));

    turns.push(Turn::developer(format!(
        r#"Output contract for the final answer:
- Return the article as clean HTML only. No <html>, <head> or <body> tags, no markdown, no code fences around the HTML.
- Wrap the whole article in a single <div lang="{locale}" dir="rtl">.
- Use only structural tags: h1, h2, h3, p, ul, ol, li, strong, em, blockquote, table, thead, tbody, tr, th, td, a.
- No inline styles, no class or id attributes, no custom attributes.
- Do not put FAQs in the HTML; they belong in the structured data only.
- Mark every image position with an HTML comment of the form <!-- image: search query -->.
- After the closing </div>, output exactly one ```json fenced block with this object and these keys only:
{skeleton}
Reply OK."#,
        locale = ctx.locale,
        skeleton = structured_skeleton(),
    )));

    turns.push(Turn::user(format!(
        "Primary keyword: «{}». Reply OK.",
        ctx.keyword
    )));

    for (i, page) in ctx.research.iter().enumerate() {
        let summary = serde_json::to_string_pretty(page).unwrap_or_default();
        turns.push(Turn::user(format!(
            "Competitor page {} of {} ranking for the keyword. Study its structure, coverage and depth; \
             do not copy its text.\n{summary}\nReply OK.",
            i + 1,
            ctx.research.len()
        )));
    }

    let related = serde_json::to_string_pretty(&ctx.related).unwrap_or_default();
    turns.push(Turn::user(format!(
        r#"Internal link candidates (existing posts on the same site):
{related}
Linking policy:
- Add between 2 and 4 internal links, each to a different candidate, only where the topic genuinely fits.
- Derive the anchor text from the target post's title or its main phrase; never use "click here" or bare URLs.
- Classify each target's search intent (informational, commercial, navigational) and link from a paragraph with the same intent.
- Never link the primary keyword itself to another post.
Reply OK."#
    )));

    turns.push(Turn::user(format!(
        "Allowed categories: {}\nAllowed tags: {}\n\
         Select categories only from this list. Prefer tags from this list; \
         if fewer than 5 fit, add short new tags. Reply OK.",
        ctx.categories.join("، "),
        ctx.tags.join("، "),
    )));

    turns.push(Turn::user(format!(
        r#"{GENERATE_TRIGGER}
Write the full article for the primary keyword «{keyword}» now:
1. A title containing the keyword.
2. A short summary paragraph.
3. An introduction of about 100 words that contains the keyword in its first sentence.
4. Twelve h2 headings; under some of them add 2–3 h3 sub-headings.
5. Short paragraphs (at most 3 lines each), simple language, conversational tone, no keyword stuffing.
6. A conclusion.
7. Image placeholders (<!-- image: query -->) after the introduction and after every third section; every query must include the keyword.
8. Then the ```json block exactly as specified in the output contract."#,
        keyword = ctx.keyword,
    )));

    turns
}

/// Ask for a corrected structured-data object only.
pub fn fix_request(defects: &[String], keys: &[&str]) -> String {
    let listed = defects
        .iter()
        .map(|d| format!("- {d}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"The structured data in your last answer is incomplete or invalid.
Problems:
{listed}
Keys to fix: {keys}
Do NOT write the article again. Return only one corrected JSON object with all keys of the output contract:
{skeleton}"#,
        keys = keys.join(", "),
        skeleton = structured_skeleton(),
    )
}

/// One turn carrying the scorer's findings and the editing rules.
pub fn revision_request(keyword: &str, title: &str, findings: &[SeoFinding]) -> String {
    let feedback = serde_json::to_string_pretty(findings).unwrap_or_default();

    format!(
        r#"The article «{title}» (primary keyword «{keyword}») was analysed by an SEO scorer.
Each finding has an `identifier` (rule), `text` (the scorer's explanation), `rating` (ok or bad), `score` (0-9, higher is better) and `spans`: the exact blocks of your HTML that triggered it (`fullText`) with their first word (`leadingToken`).

Findings:
{feedback}

Targets:
- Keyword density between 0.5% and 3% of all words.
- Meta description between 120 and 156 characters and containing the keyword.
- 30% to 75% of h2/h3 subheadings contain the keyword or one of its synonyms.
- No more than 2 consecutive sentences start with the same word (see `leadingToken`).
- Prefer sentences shorter than 20 words.
- At least 30% of sentences contain a transition word.
- Less than 10% of sentences in passive voice.
- At most 150 words per paragraph.

Editing rules:
- For every flagged span make the smallest edit that resolves its finding; leave unflagged blocks untouched.
- When fixing keyword density and subheading coverage conflict, fix the density in the body first.
- Keep the output contract: the full revised HTML in the single rtl <div>, then the ```json block with every key, including the revised title, slug and meta."#
    )
}

/// Revision request for a conversation that never saw the article: carries
/// the current document and the structured-data shape along with the
/// findings.
pub fn detached_revision_request(
    keyword: &str,
    title: &str,
    document: &str,
    findings: &[SeoFinding],
) -> String {
    format!(
        r#"{request}

This conversation has no earlier messages. The current article follows; revise this text rather than writing a new one.
{document}

The ```json block after the article must use this object and these keys only:
{skeleton}"#,
        request = revision_request(keyword, title, findings),
        skeleton = structured_skeleton(),
    )
}
