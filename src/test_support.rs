//! Scripted HTTP server for client tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::IntoResponse;
use tokio::net::TcpListener;

use crate::retry::RetryPolicy;

#[derive(Clone)]
struct Script {
    replies: Arc<Vec<(u16, String)>>,
    routes: Arc<HashMap<String, (u16, String)>>,
    hits: Arc<AtomicUsize>,
}

/// Answers the n-th request with the n-th scripted reply, repeating the last
/// one once the script runs out.  Every path is served; paths registered
/// with [`StubServer::routes`] always get their own reply instead.
pub struct StubServer {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl StubServer {
    pub async fn start(replies: &[(u16, &str)]) -> Self {
        Self::serve(replies, &[]).await
    }

    /// Fixed replies per path; anything else gets a 404.
    pub async fn routes(routes: &[(&str, u16, &str)]) -> Self {
        Self::serve(&[(404, "")], routes).await
    }

    /// `{base}` in a reply body is replaced with the server's own URL.
    async fn serve(replies: &[(u16, &str)], routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let body = |b: &str| b.replace("{base}", &url);

        let hits = Arc::new(AtomicUsize::new(0));
        let script = Script {
            replies: Arc::new(replies.iter().map(|(s, b)| (*s, body(b))).collect()),
            routes: Arc::new(
                routes
                    .iter()
                    .map(|(path, s, b)| (path.to_string(), (*s, body(b))))
                    .collect(),
            ),
            hits: hits.clone(),
        };
        let app = Router::new().fallback(reply).with_state(script);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, hits }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn reply(State(script): State<Script>, uri: Uri) -> impl IntoResponse {
    let n = script.hits.fetch_add(1, Ordering::SeqCst);
    let (status, body) = match script.routes.get(uri.path()) {
        Some(route) => route.clone(),
        None => script.replies[n.min(script.replies.len() - 1)].clone(),
    };
    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}

/// Millisecond backoff so retry tests stay fast.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_millis(1),
        cap: Duration::from_millis(4),
        max_attempts,
    }
}
