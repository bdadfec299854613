//! Blocking API client for the trainer backend (teams, accounts, high scores,
//! leaderboard).
//!
//! # Overview
//! `ApiClient` builds `HttpRequest` values, hands them to an injected
//! `Transport`, and runs every response through one shared handler. Session
//! tokens live in an injected `SessionStore`; the client writes them on login
//! and clears them on logout or on any 401.
//!
//! # Design
//! - Requests and responses are plain data (`http` module), so every operation
//!   is testable without a network.
//! - `UreqTransport` (feature `ureq`, on by default) is the stock transport.
//! - Logging goes through `tracing`; the host installs the subscriber.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{ApiClient, DEFAULT_LEADERBOARD_DIFFICULTY};
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{FileSessionStore, MemorySessionStore, SessionKey, SessionStore, StoreError};
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use transport::{Transport, TransportError};
pub use types::{TeamAction, TokenPair};
