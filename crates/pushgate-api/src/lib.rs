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

//! HTTP layer for Pushgate: the request-admission pipeline, submit
//! validation, the dispatch handler, and the admin JSON surface.

pub mod config;
pub mod dispatch;
pub mod signing;
pub mod store;

mod http;
mod state;

pub use config::{AdmissionConfig, ApiConfig};
pub use dispatch::{Dispatcher, SharedDispatcher};
pub use http::router::ApiServer;
pub use signing::sign_request;
pub use store::{CredentialFacade, PgStore, SharedStore};
