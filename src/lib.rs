//! Versioned tree view over a remote store that only offers a flat listing
//!
//! [`Client`] is the async entry point, [`BlockingClient`] drives the same
//! operations from synchronous code.

pub mod app_state;
pub mod auth;
pub mod blocking;
pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod log_appender;
pub mod persistency;
pub mod registry;
pub mod remote;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use blocking::BlockingClient;
pub use client::Client;
pub use errors::{CloudError, Result};
pub use registry::item::{Item, ROOT_ID, TRASH_ID};
pub use remote::remote_client::{FileType, ItemKind, MetadataUpdate, RemoteDirectoryClient};
