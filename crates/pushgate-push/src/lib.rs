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

//! Provider multiplexer for Pushgate: per-tenant APNs HTTP/2 providers and
//! FCM messaging clients with batching and invalid-token classification.

pub mod apns;
pub mod error;
pub mod fcm;
pub mod message;
pub mod mux;

pub use apns::{ApnsCredentials, ApnsProvider};
pub use error::{PushError, Result as PushResult};
pub use fcm::{FcmClient, FcmCredentials};
pub use message::{
    ApnsOverrides, FcmOverrides, FcmPriority, Notification, Platform, SendOutcome, SubmitRequest,
};
pub use mux::{MuxConfig, ProviderMux};
