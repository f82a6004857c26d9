//! Core library for the Drafts MCP bridge.
//!
//! Write operations go through the Drafts URL scheme: the bridge builds an
//! `x-callback-url`, opens it, and waits for the app to call back into a
//! local HTTP listener. Read operations (listing, full-text search) go
//! straight to the app's SQLite store.

pub mod callback;
pub mod client;
pub mod error;
pub mod server;
pub mod store;
pub mod tools;
pub mod transport;
pub mod url_scheme;
pub mod utils;

pub use callback::{CallbackOutcome, CallbackServer, CallbackUrls, PendingCallback};
pub use client::{CreateOptions, Draft, DraftsClient, SystemOpener, UrlOpener};
pub use error::DraftsError;
pub use server::{JsonRpcHandler, McpServer};
pub use store::{DraftsStore, Folder, StoredDraft};
pub use transport::StdioTransport;
