//! Operator dashboard back-end: JSON API, deployment-status webhook and the
//! notification WebSocket, served from one axum router.

pub mod api;
pub mod notify;
pub mod server;

pub use api::{AppState, SharedState};
pub use notify::{Notification, Notifier};
pub use server::{ServerConfig, build_router, start_server};
