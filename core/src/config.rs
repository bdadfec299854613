//! Where the backend is reached.
//!
//! The base path stays relative to the origin so the same client works behind
//! a reverse proxy that mounts the API at `/api`.

use std::env;

pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:3000";
pub const DEFAULT_BASE_PATH: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub origin: String,
    pub base_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

impl ClientConfig {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
        }
    }

    /// Read `BACKEND_ORIGIN` and `BACKEND_API_BASE_PATH`, falling back to defaults.
    pub fn from_env() -> Self {
        let origin = env::var("BACKEND_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
        let base_path =
            env::var("BACKEND_API_BASE_PATH").unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string());
        Self { origin, base_path }
    }

    /// Origin and base path joined, without a trailing slash.
    pub fn base_url(&self) -> String {
        let origin = self.origin.trim_end_matches('/');
        let base_path = self.base_path.trim_matches('/');
        if base_path.is_empty() {
            origin.to_string()
        } else {
            format!("{origin}/{base_path}")
        }
    }
}
