use serde::Serialize;

/// Who a turn is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Standing instructions from the application.
    Developer,
    User,
}

/// One role-tagged message sent to the generation capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn developer(content: impl Into<String>) -> Self {
        Self {
            role: Role::Developer,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call generation context passed to every `LlmBackend::generate`
/// invocation.
///
/// Only the new turns travel with the call; earlier turns live server-side
/// under `conversation_id`.
pub struct GenerateContext<'a> {
    pub conversation_id: &'a str,
    pub turns: &'a [Turn],
}
