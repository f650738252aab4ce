#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Pushgate application bootstrap wiring.
//!
//! Layout: `config.rs` (environment parsing), `bootstrap.rs` (service
//! wiring and lifecycle), `error.rs` (application errors).

/// Application bootstrap and lifecycle.
pub mod bootstrap;
/// Environment configuration parsing.
pub mod config;
/// Application-level error types.
pub mod error;

pub use bootstrap::run_app;
pub use config::GatewayConfig;
pub use error::{AppError, AppResult};
