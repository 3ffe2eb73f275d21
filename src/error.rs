use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutoblogError {
    #[error("config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    /// Transport-level failure of a remote call (connect, timeout, 429,
    /// 5xx).  Retried by the backoff layer before it surfaces.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("scorer error: {0}")]
    Scorer(String),

    #[error("WordPress error: {0}")]
    WordPress(String),

    #[error("research error: {0}")]
    Research(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl AutoblogError {
    /// Whether the retry layer may try the failed call again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status()
                        .is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AutoblogError>;
