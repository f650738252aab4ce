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

//! Persistence layer for Pushgate: tenant apps and credentials, admin
//! principals and settings, and the replay-protection nonce table.

pub mod admin;
pub mod apps;
pub mod error;
pub mod model;
pub mod nonce;
pub mod secrets;

pub use apps::CredentialStore;
pub use error::{DataError, Result as DataResult};
pub use model::{
    AdminBootstrap, AdminSettings, AdminUser, AndroidCredential, App, AppPatch, IosCredential,
    NewIosCredential, TenantConfig,
};
pub use nonce::NonceStore;
