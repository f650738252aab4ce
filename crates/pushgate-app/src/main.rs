#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Binary entrypoint that wires the Pushgate services together and blocks
//! until shutdown.

use pushgate_app::AppResult;

/// Bootstraps the gateway and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    pushgate_app::run_app().await
}
