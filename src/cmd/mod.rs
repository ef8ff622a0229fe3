//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled   |
//! |-----------|--------------------|
//! | `project` | `Init`             |
//! | `serve`   | `Serve`, `Proxy`   |
//! | `jobs`    | `Jobs`, `Stats`    |
//! | `deploy`  | `Deploy`           |
//! | `config`  | `Config`           |

pub mod config;
pub mod deploy;
pub mod jobs;
pub mod project;
pub mod serve;

pub use config::cmd_config;
pub use deploy::cmd_deploy;
pub use jobs::{cmd_jobs, cmd_stats};
pub use project::cmd_init;
pub use serve::{cmd_proxy, cmd_serve};
