//! Request DTOs for the trainer backend.
//!
//! Response bodies are endpoint-specific and handed back as
//! `serde_json::Value`; only the login response is inspected by the client.

use serde::{Deserialize, Serialize};

/// Whether a Pokémon is being added to or removed from the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateTeam {
    pub pokemon_id: u32,
    pub action: TeamAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct Signup<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Logout<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HighScore {
    pub difficulty: String,
    pub score: u64,
}

/// The token pair found in a successful login body.
///
/// `access` decides whether anything is persisted; a body without it leaves
/// the session store untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl TokenPair {
    /// Extract the pair from a login body. Non-string fields count as absent.
    pub fn from_body(body: &serde_json::Value) -> Self {
        let field = |name: &str| {
            body.get(name)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        Self {
            access: field("access"),
            refresh: field("refresh"),
        }
    }
}
