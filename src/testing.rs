//! Local stand-in for the n8n service, used by unit tests.
//!
//! Binds to localhost on a dynamic port, records every request it receives and
//! answers each one with a canned response.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode, header};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    /// Path plus query string.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

pub(crate) struct StubUpstream {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl StubUpstream {
    pub async fn json(status: StatusCode, body: serde_json::Value) -> Self {
        Self::start(status, "application/json", body.to_string(), Duration::ZERO).await
    }

    pub async fn text(status: StatusCode, body: &str) -> Self {
        Self::start(status, "text/html", body.to_string(), Duration::ZERO).await
    }

    /// Holds every request for `delay` before answering.
    pub async fn slow(delay: Duration) -> Self {
        Self::start(StatusCode::OK, "application/json", "{}".to_string(), delay).await
    }

    async fn start(
        status: StatusCode,
        content_type: &'static str,
        body: String,
        delay: Duration,
    ) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorder = requests.clone();

        let app = Router::new().fallback(move |request: Request| {
            let recorder = recorder.clone();
            let body = body.clone();
            async move {
                let (parts, incoming) = request.into_parts();
                let bytes = axum::body::to_bytes(incoming, usize::MAX)
                    .await
                    .unwrap_or_default();
                recorder.lock().unwrap().push(RecordedRequest {
                    method: parts.method.to_string(),
                    uri: parts
                        .uri
                        .path_and_query()
                        .map(|pq| pq.to_string())
                        .unwrap_or_default(),
                    headers: parts.headers,
                    body: bytes,
                });
                tokio::time::sleep(delay).await;
                (status, [(header::CONTENT_TYPE, content_type)], body)
            }
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub upstream");
        let addr = listener.local_addr().expect("stub upstream address");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            url: format!("http://{}", addr),
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
