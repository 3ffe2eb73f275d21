use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::article::context::GenerationContext;
use crate::article::schema::{self, CONVERSATION_ID_KEY, StructuredRecord};
use crate::article::split::{extract_payload, split_response};
use crate::error::{AutoblogError, Result};
use crate::llm::{GenerateContext, LlmEngine, Turn, prompts};
use crate::seo::SeoFinding;

pub const DEFAULT_REPAIR_ATTEMPTS: usize = 3;

/// Resumable handle on one article's conversation.
///
/// Passed explicitly into every session call; persisting the record (which
/// carries `conversation_id`) is enough to resume editing later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Created lazily on the first turn.
    pub conversation_id: Option<String>,
    /// Raw text of the most recent reply.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_response: String,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume the conversation a persisted record was produced in.
    pub fn resume(record: &StructuredRecord) -> Self {
        Self {
            conversation_id: Some(record.conversation_id.clone()).filter(|id| !id.is_empty()),
            last_response: String::new(),
        }
    }
}

/// How the structured payload of a draft was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Valid on first parse.
    Valid,
    /// Valid after this many fix requests.
    Repaired { attempts: usize },
    /// Still defective after the repair loop; typed empty defaults were
    /// filled in for these defects.
    DefaultFilled { unresolved: Vec<String> },
}

/// One document/record pair produced by the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub document: String,
    pub record: StructuredRecord,
    pub outcome: RepairOutcome,
}

/// Drives one article through the generation capability.
pub struct ArticleSession<'a> {
    engine: &'a LlmEngine,
    context: &'a GenerationContext,
    repair_attempts: usize,
}

impl<'a> ArticleSession<'a> {
    pub fn new(engine: &'a LlmEngine, context: &'a GenerationContext) -> Self {
        Self {
            engine,
            context,
            repair_attempts: DEFAULT_REPAIR_ATTEMPTS,
        }
    }

    pub fn with_repair_attempts(mut self, attempts: usize) -> Self {
        self.repair_attempts = attempts;
        self
    }

    /// Send `turns` on the state's conversation, creating it on first use.
    async fn send(&self, state: &mut ConversationState, turns: &[Turn]) -> Result<String> {
        let conversation_id = match &state.conversation_id {
            Some(id) => id.clone(),
            None => {
                let id = self.engine.create_conversation().await?;
                state.conversation_id = Some(id.clone());
                id
            }
        };

        let reply = self
            .engine
            .generate(&GenerateContext {
                conversation_id: &conversation_id,
                turns,
            })
            .await?;
        state.last_response = reply.clone();
        Ok(reply)
    }

    /// Deliver the context turn by turn, then trigger the full article.
    pub async fn generate_full(&self, state: &mut ConversationState) -> Result<Draft> {
        let turns = prompts::staged_turns(self.context);
        let total = turns.len();
        info!(keyword = %self.context.keyword, turns = total, "starting staged generation");

        let mut reply = String::new();
        for (i, turn) in turns.into_iter().enumerate() {
            reply = self.send(state, std::slice::from_ref(&turn)).await?;
            if i + 1 < total {
                debug!(turn = i + 1, ack = %reply.chars().take(40).collect::<String>(), "context turn acknowledged");
            }
        }

        let split = split_response(&reply);
        if split.body.is_empty() {
            warn!("generation reply carried no document body");
        }
        self.finish(state, split.body, split.payload).await
    }

    /// Ask for a revision of `document` that resolves `findings`, then
    /// re-extract.  Without a conversation to continue, the document itself
    /// travels with the request.
    pub async fn revise(
        &self,
        state: &mut ConversationState,
        document: &str,
        title: &str,
        findings: &[SeoFinding],
    ) -> Result<Draft> {
        let keyword = &self.context.keyword;
        let request = if state.conversation_id.is_some() {
            prompts::revision_request(keyword, title, findings)
        } else {
            warn!(keyword = %keyword, "no conversation to continue, sending the article with the revision request");
            prompts::detached_revision_request(keyword, title, document, findings)
        };
        info!(findings = findings.len(), "requesting revision");

        let reply = self.send(state, &[Turn::user(request)]).await?;
        let split = split_response(&reply);
        if split.body.is_empty() {
            return Err(AutoblogError::Llm("revision reply carried no document".into()));
        }
        self.finish(state, split.body, split.payload).await
    }

    async fn finish(
        &self,
        state: &mut ConversationState,
        document: String,
        payload: Map<String, Value>,
    ) -> Result<Draft> {
        let (mut payload, outcome) = self.repair(state, payload).await;

        if let Some(id) = &state.conversation_id {
            payload.insert(CONVERSATION_ID_KEY.into(), Value::String(id.clone()));
        }
        let record = StructuredRecord::from_payload(payload)?;

        for note in record.quality_notes(&self.context.keyword, &self.context.categories) {
            warn!(note = %note, "structured data below expectations");
        }

        Ok(Draft {
            document,
            record,
            outcome,
        })
    }

    /// Validate, request fixes for defective keys, and fall back to typed
    /// defaults once the attempt budget or the network gives out.
    async fn repair(
        &self,
        state: &mut ConversationState,
        mut payload: Map<String, Value>,
    ) -> (Map<String, Value>, RepairOutcome) {
        let mut attempts = 0;

        loop {
            let defects = schema::validate(&payload);
            if defects.is_empty() {
                let outcome = if attempts == 0 {
                    RepairOutcome::Valid
                } else {
                    RepairOutcome::Repaired { attempts }
                };
                return (payload, outcome);
            }

            if attempts >= self.repair_attempts {
                warn!(attempts, defects = ?defects, "structured data still defective, filling defaults");
                schema::fill_defaults(&mut payload);
                return (payload, RepairOutcome::DefaultFilled { unresolved: defects });
            }

            attempts += 1;
            let keys = schema::defective_keys(&payload);
            info!(attempt = attempts, keys = ?keys, "requesting structured data fix");

            let request = prompts::fix_request(&defects, &keys);
            match self.send(state, &[Turn::user(request)]).await {
                Ok(reply) => {
                    let fixed = extract_payload(&reply);
                    if fixed.is_empty() {
                        debug!(attempt = attempts, "fix reply carried no JSON object");
                    }
                    payload.extend(fixed);
                }
                Err(e) => {
                    warn!(error = %e, "repair request failed, filling defaults");
                    schema::fill_defaults(&mut payload);
                    return (payload, RepairOutcome::DefaultFilled { unresolved: defects });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmBackend;
    use crate::retry::RetryPolicy;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replies "OK" to context turns, the scripted final replies to the
    /// trigger turn and fix requests, and records every call.
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<Vec<(String, Vec<Turn>)>>,
        conversations: Mutex<u32>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            })
        }

        fn call_count_matching(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, turns)| turns.iter().any(|t| t.content.contains(needle)))
                .count()
        }
    }

    #[async_trait::async_trait]
    impl LlmBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn create_conversation(&self) -> Result<String> {
            let mut n = self.conversations.lock().unwrap();
            *n += 1;
            Ok(format!("conv_{n}"))
        }

        async fn generate(&self, ctx: &GenerateContext<'_>) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((ctx.conversation_id.to_string(), ctx.turns.to_vec()));

            let is_context_turn = ctx.turns.iter().all(|t| {
                t.content.contains("Reply OK") || t.content.contains("single word: OK")
            });
            if is_context_turn {
                return Ok("OK".into());
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("{}".into()))
        }
    }

    fn engine(backend: Arc<ScriptedBackend>) -> LlmEngine {
        LlmEngine::with_backend(
            backend,
            RetryPolicy {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(1),
                max_attempts: 1,
            },
        )
    }

    const DOC: &str = r#"<div lang="fa" dir="rtl"><h1>X</h1></div>"#;

    #[tokio::test]
    async fn full_generation_end_to_end() {
        let reply = format!(
            r#"{DOC}{{"title":"X","slug":"x","categories":[],"tags":[],"faqs":[{{"question":"q","answer":"a"}}],"meta":"m","sources":[]}}"#
        );
        let backend = ScriptedBackend::new(vec![Ok(reply)]);
        let engine = engine(backend.clone());
        let ctx = GenerationContext::new("سرما خوردگی", "fa");
        let session = ArticleSession::new(&engine, &ctx);

        let mut state = ConversationState::new();
        let draft = session.generate_full(&mut state).await.unwrap();

        assert_eq!(draft.outcome, RepairOutcome::Valid);
        assert_eq!(draft.document, DOC);
        assert_eq!(draft.record.title, "X");
        assert_eq!(draft.record.conversation_id, "conv_1");
        assert_eq!(state.conversation_id.as_deref(), Some("conv_1"));
        assert_eq!(*backend.conversations.lock().unwrap(), 1);

        // every staged turn went out as its own call on the same conversation
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), prompts::staged_turns(&ctx).len());
        assert!(calls.iter().all(|(id, turns)| id == "conv_1" && turns.len() == 1));
    }

    #[tokio::test]
    async fn empty_replies_are_default_filled_after_three_attempts() {
        let backend = ScriptedBackend::new(Vec::new());
        let engine = engine(backend.clone());
        let ctx = GenerationContext::new("kw", "fa");
        let session = ArticleSession::new(&engine, &ctx);

        let mut state = ConversationState::new();
        let draft = session.generate_full(&mut state).await.unwrap();

        assert_eq!(backend.call_count_matching("Do NOT write the article again"), 3);
        assert!(matches!(draft.outcome, RepairOutcome::DefaultFilled { ref unresolved } if unresolved.len() == 7));
        assert_eq!(draft.record.faqs, vec![schema::Faq::default()]);
        assert_eq!(draft.record.sources, vec![schema::Source::default()]);
        assert!(draft.record.title.is_empty());
        assert_eq!(draft.record.conversation_id, "conv_1");
    }

    #[tokio::test]
    async fn fix_reply_is_merged_into_payload() {
        let first = format!(r#"{DOC}{{"title":"X","slug":"x","categories":[],"tags":[],"meta":"m","sources":[]}}"#);
        let fix = r#"```json
{"faqs": [{"question": "q", "answer": "a"}]}
```"#;
        let backend = ScriptedBackend::new(vec![Ok(first), Ok(fix.into())]);
        let engine = engine(backend.clone());
        let ctx = GenerationContext::new("kw", "fa");
        let session = ArticleSession::new(&engine, &ctx);

        let draft = session.generate_full(&mut ConversationState::new()).await.unwrap();
        assert_eq!(draft.outcome, RepairOutcome::Repaired { attempts: 1 });
        assert_eq!(draft.record.faqs.len(), 1);
        assert_eq!(draft.record.title, "X");
        assert_eq!(draft.document, DOC);
    }

    #[tokio::test]
    async fn network_failure_during_repair_falls_back_to_defaults() {
        let first = format!(r#"{DOC}{{"title":"X"}}"#);
        let backend = ScriptedBackend::new(vec![
            Ok(first),
            Err(AutoblogError::Transport("connection reset".into())),
        ]);
        let engine = engine(backend.clone());
        let ctx = GenerationContext::new("kw", "fa");
        let session = ArticleSession::new(&engine, &ctx);

        let draft = session.generate_full(&mut ConversationState::new()).await.unwrap();
        assert!(matches!(draft.outcome, RepairOutcome::DefaultFilled { .. }));
        assert_eq!(draft.record.title, "X");
        assert!(draft.record.tags.is_empty());
        assert_eq!(backend.call_count_matching("Do NOT write the article again"), 1);
    }

    #[tokio::test]
    async fn revise_reuses_persisted_conversation() {
        let reply = format!(
            r#"{DOC}
```json
{{"title":"Y","slug":"y","categories":[],"tags":[],"faqs":[],"meta":"m","sources":[]}}
```"#
        );
        let backend = ScriptedBackend::new(vec![Ok(reply)]);
        let engine = engine(backend.clone());
        let ctx = GenerationContext::new("kw", "fa");
        let session = ArticleSession::new(&engine, &ctx);

        let record = StructuredRecord {
            conversation_id: "conv_saved".into(),
            ..Default::default()
        };
        let mut state = ConversationState::resume(&record);
        let draft = session.revise(&mut state, DOC, "X", &[]).await.unwrap();

        assert_eq!(*backend.conversations.lock().unwrap(), 0);
        assert_eq!(draft.record.title, "Y");
        assert_eq!(draft.record.conversation_id, "conv_saved");
        assert_eq!(draft.document, DOC);
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1[0].content.contains("smallest edit"));
        assert!(!calls[0].1[0].content.contains(DOC));
    }

    #[tokio::test]
    async fn revision_without_conversation_carries_the_article() {
        let reply = format!(
            r#"{DOC}{{"title":"Y","slug":"y","categories":[],"tags":[],"faqs":[{{"question":"q","answer":"a"}}],"meta":"m","sources":[]}}"#
        );
        let backend = ScriptedBackend::new(vec![Ok(reply)]);
        let engine = engine(backend.clone());
        let ctx = GenerationContext::new("kw", "fa");
        let session = ArticleSession::new(&engine, &ctx);

        let stored = StructuredRecord::default();
        let mut state = ConversationState::resume(&stored);
        let current = r#"<div lang="fa" dir="rtl"><p>current text</p></div>"#;
        let draft = session.revise(&mut state, current, "X", &[]).await.unwrap();

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let sent = &calls[0].1[0].content;
        assert!(sent.contains(current));
        assert!(sent.contains("\"faqs\""));
        assert_eq!(*backend.conversations.lock().unwrap(), 1);
        assert_eq!(draft.record.conversation_id, "conv_1");
        assert_eq!(draft.outcome, RepairOutcome::Valid);
    }

    #[tokio::test]
    async fn revision_without_document_is_an_error() {
        let backend = ScriptedBackend::new(vec![Ok(r#"{"title": "only json"}"#.into())]);
        let engine = engine(backend);
        let ctx = GenerationContext::new("kw", "fa");
        let session = ArticleSession::new(&engine, &ctx);

        let result = session.revise(&mut ConversationState::new(), DOC, "X", &[]).await;
        assert!(matches!(result, Err(AutoblogError::Llm(_))));
    }

    #[test]
    fn state_round_trips_through_record() {
        let empty = ConversationState::resume(&StructuredRecord::default());
        assert_eq!(empty.conversation_id, None);
    }
}
