//! Operator notifications, pushed to dashboard clients over `/ws`.

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use ghost_common::{BuildJob, BuildStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::store::JobChange;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Notification {
    JobCreated {
        job: BuildJob,
    },
    JobUpdated {
        job: BuildJob,
    },
    /// The site for a job went live. Fired once per job.
    SiteLive {
        job_id: String,
        business_name: String,
        url: Option<String>,
    },
    /// The deployment pipeline started rolling out a job's site.
    Deploying {
        job_id: String,
        business_name: String,
    },
    DeployFailed {
        job_id: String,
        business_name: String,
        error: Option<String>,
    },
    /// Celebration: an invoice was paid.
    PaymentReceived {
        job_id: String,
        business_name: String,
        amount: f64,
    },
    /// The deployment pipeline reported a status this system does not know.
    NeedsAttention {
        job_id: String,
        business_name: String,
        reported_status: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "JobCreated",
            Self::JobUpdated { .. } => "JobUpdated",
            Self::SiteLive { .. } => "SiteLive",
            Self::Deploying { .. } => "Deploying",
            Self::DeployFailed { .. } => "DeployFailed",
            Self::PaymentReceived { .. } => "PaymentReceived",
            Self::NeedsAttention { .. } => "NeedsAttention",
        }
    }
}

/// Fan-out point for notifications. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<String>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Serialize and broadcast to every connected client. Having no
    /// clients is not an error.
    pub fn notify(&self, notification: &Notification) {
        match serde_json::to_string(notification) {
            Ok(json) => {
                tracing::debug!(kind = notification.kind(), "Broadcasting notification");
                let _ = self.tx.send(json);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize notification");
            }
        }
    }

    /// Announce a stored change. Status notifications fire only on the
    /// mutation that actually moved the status, so replays stay silent.
    pub fn job_changed(&self, change: &JobChange) {
        if change.before == change.after {
            return;
        }
        self.notify(&Notification::JobUpdated {
            job: change.after.clone(),
        });

        let job = &change.after;
        if change.entered(BuildStatus::AutoDeploying) {
            self.notify(&Notification::Deploying {
                job_id: job.id.clone(),
                business_name: job.business_name.clone(),
            });
        }
        if change.entered(BuildStatus::Live) {
            self.notify(&Notification::SiteLive {
                job_id: job.id.clone(),
                business_name: job.business_name.clone(),
                url: job
                    .render_deployment_url
                    .clone()
                    .or_else(|| job.preview_url.clone()),
            });
        }
        if change.entered(BuildStatus::Error) {
            self.notify(&Notification::DeployFailed {
                job_id: job.id.clone(),
                business_name: job.business_name.clone(),
                error: job.error_message.clone(),
            });
        }
        if change.became_paid() {
            self.notify(&Notification::PaymentReceived {
                job_id: job.id.clone(),
                business_name: job.business_name.clone(),
                amount: job.amount,
            });
        }
    }
}

// ── WebSocket ────────────────────────────────────────────────────────

pub async fn ws_handler(ws: WebSocketUpgrade, State(notifier): State<Notifier>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, notifier))
}

async fn handle_socket(socket: WebSocket, notifier: Notifier) {
    let (sender, receiver) = socket.split();
    let rx = notifier.subscribe();
    run_socket_loop(sender, receiver, rx).await;
}

/// Forward broadcasts to one client, with ping/pong keepalive. If no Pong
/// arrives within [`PONG_TIMEOUT`] the connection is dropped.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("WebSocket client stopped answering pings");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket client lagging; notifications dropped");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

#[cfg(test)]
pub(crate) fn drain(rx: &mut broadcast::Receiver<String>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(json) = rx.try_recv() {
        if let Ok(notification) = serde_json::from_str(&json) {
            out.push(notification);
        }
    }
    out
}
