//! Ghost Hunter CRM back-end.
//!
//! | Module         | Role                                                     |
//! |----------------|----------------------------------------------------------|
//! | `proxy`        | credential proxy in front of the n8n API                 |
//! | `orchestrator` | staged deploy pipeline and one-shot outreach calls       |
//! | `automation`   | outbound n8n webhook client, demo fallback               |
//! | `webhook`      | authenticated deployment-status callbacks                |
//! | `store`        | SQLite job table and revenue ledger                      |
//! | `dashboard`    | JSON API, notification socket, server                    |

pub mod automation;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod orchestrator;
pub mod proxy;
pub mod store;
pub mod telemetry;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;
