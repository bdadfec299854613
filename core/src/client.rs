//! Request builder, response handler and operations for the trainer API.
//!
//! # Design
//! Each operation is split into a pure `build_*` method producing an
//! `HttpRequest`, one trip through the injected `Transport`, and the shared
//! `handle_response`. The only state the client mutates is the injected
//! `SessionStore`: login writes it, logout and any 401 clear its tokens.
//!
//! Signup, login and logout wrap every failure in a fixed-message error; the
//! other operations return the underlying error unchanged.

use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::{SessionKey, SessionStore};
use crate::transport::Transport;
use crate::types::{Credentials, HighScore, Logout, Signup, TeamAction, TokenPair, UpdateTeam};

/// Leaderboard filter used when the caller does not pick a difficulty.
pub const DEFAULT_LEADERBOARD_DIFFICULTY: &str = "all";

/// Blocking client for the trainer backend.
#[derive(Debug, Clone)]
pub struct ApiClient<T, S> {
    base_url: String,
    transport: T,
    store: S,
}

impl<T: Transport, S: SessionStore> ApiClient<T, S> {
    pub fn new(config: &ClientConfig, transport: T, store: S) -> Self {
        Self {
            base_url: config.base_url(),
            transport,
            store,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    /// Fails with `AuthRequired` on an empty token.
    pub fn build_update_team(
        &self,
        token: &str,
        pokemon_id: u32,
        action: TeamAction,
    ) -> Result<HttpRequest, ApiError> {
        if token.is_empty() {
            return Err(ApiError::AuthRequired);
        }
        self.post(
            "/users/update_team/",
            Some(token),
            &UpdateTeam { pokemon_id, action },
        )
    }

    pub fn build_get_team(&self, token: &str) -> HttpRequest {
        self.get("/users/team/", Some(token))
    }

    pub fn build_signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<HttpRequest, ApiError> {
        self.post(
            "/users/register/",
            None,
            &Signup {
                username,
                email,
                password,
            },
        )
    }

    pub fn build_login(&self, username: &str, password: &str) -> Result<HttpRequest, ApiError> {
        self.post("/users/login/", None, &Credentials { username, password })
    }

    pub fn build_logout(&self, refresh_token: &str) -> Result<HttpRequest, ApiError> {
        self.post(
            "/users/logout/",
            None,
            &Logout {
                refresh: refresh_token,
            },
        )
    }

    pub fn build_update_high_score(
        &self,
        token: &str,
        difficulty: &str,
        score: u64,
    ) -> Result<HttpRequest, ApiError> {
        self.post(
            "/users/update_high_score/",
            Some(token),
            &HighScore {
                difficulty: difficulty.to_string(),
                score,
            },
        )
    }

    /// `None` selects every difficulty.
    pub fn build_get_leaderboard(&self, difficulty: Option<&str>) -> HttpRequest {
        let difficulty = difficulty.unwrap_or(DEFAULT_LEADERBOARD_DIFFICULTY);
        let encoded: String = url::form_urlencoded::byte_serialize(difficulty.as_bytes()).collect();
        self.get(&format!("/users/leaderboard/?difficulty={encoded}"), None)
    }

    // -----------------------------------------------------------------------
    // Response handling
    // -----------------------------------------------------------------------

    /// Interpret a response the same way for every endpoint.
    ///
    /// A body that is not JSON reads as `{}`. On 401 both stored tokens are
    /// removed before the error is returned.
    pub fn handle_response(&self, response: HttpResponse) -> Result<Value, ApiError> {
        let data = parse_body(&response.body);
        tracing::debug!(status = response.status, "response received");

        if response.is_success() {
            return Ok(data);
        }

        let message = data
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", response.status));

        if response.status == 401 {
            tracing::warn!(%message, "invalid or expired token, clearing session");
            self.store.clear_tokens()?;
            return Err(ApiError::AuthExpired { message });
        }

        Err(ApiError::Http {
            status: response.status,
            message,
        })
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Add or remove a Pokémon. No request is sent without a token.
    pub fn update_team(
        &self,
        token: &str,
        pokemon_id: u32,
        action: TeamAction,
    ) -> Result<Value, ApiError> {
        tracing::debug!(pokemon_id, ?action, has_token = !token.is_empty(), "updating team");
        let request = self.build_update_team(token, pokemon_id, action).inspect_err(|err| {
            tracing::error!(error = %err, "update team rejected");
        })?;
        self.round_trip(&request).inspect_err(|err| {
            tracing::error!(error = %err, "update team failed");
        })
    }

    pub fn get_team(&self, token: &str) -> Result<Value, ApiError> {
        tracing::debug!(has_token = !token.is_empty(), "fetching team");
        self.round_trip(&self.build_get_team(token)).inspect_err(|err| {
            tracing::error!(error = %err, "get team failed");
        })
    }

    pub fn signup(&self, username: &str, email: &str, password: &str) -> Result<Value, ApiError> {
        self.build_signup(username, email, password)
            .and_then(|request| self.round_trip(&request))
            .map_err(|err| {
                tracing::error!(error = %err, "signup failed");
                ApiError::SignupFailed(Box::new(err))
            })
    }

    /// Log in and persist the session when the response carries an access token.
    pub fn login(&self, username: &str, password: &str) -> Result<Value, ApiError> {
        self.try_login(username, password).map_err(|err| {
            tracing::error!(error = %err, "login failed");
            ApiError::LoginFailed(Box::new(err))
        })
    }

    fn try_login(&self, username: &str, password: &str) -> Result<Value, ApiError> {
        let request = self.build_login(username, password)?;
        let data = self.round_trip(&request)?;

        let tokens = TokenPair::from_body(&data);
        if let Some(access) = tokens.access {
            self.store.set(SessionKey::Username, username)?;
            self.store.set(SessionKey::Token, &access)?;
            match tokens.refresh {
                Some(refresh) => self.store.set(SessionKey::Refresh, &refresh)?,
                None => self.store.remove(SessionKey::Refresh)?,
            }
            tracing::info!(%username, "session stored");
        }
        Ok(data)
    }

    /// Revoke the refresh token. A 2xx clears stored tokens before the body is read.
    pub fn logout(&self, refresh_token: &str) -> Result<Value, ApiError> {
        self.try_logout(refresh_token).map_err(|err| {
            tracing::error!(error = %err, "logout failed");
            ApiError::LogoutFailed(Box::new(err))
        })
    }

    fn try_logout(&self, refresh_token: &str) -> Result<Value, ApiError> {
        let request = self.build_logout(refresh_token)?;
        let response = self.execute(&request)?;
        if response.is_success() {
            self.store.clear_tokens()?;
            tracing::info!("session cleared");
        }
        self.handle_response(response)
    }

    pub fn update_high_score(
        &self,
        token: &str,
        difficulty: &str,
        score: u64,
    ) -> Result<Value, ApiError> {
        tracing::debug!(%difficulty, score, has_token = !token.is_empty(), "updating high score");
        self.build_update_high_score(token, difficulty, score)
            .and_then(|request| self.round_trip(&request))
            .inspect_err(|err| {
                tracing::error!(error = %err, "update high score failed");
            })
    }

    pub fn get_leaderboard(&self, difficulty: Option<&str>) -> Result<Value, ApiError> {
        self.round_trip(&self.build_get_leaderboard(difficulty))
            .inspect_err(|err| {
                tracing::error!(error = %err, "get leaderboard failed");
            })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        tracing::debug!(method = request.method.as_str(), url = %request.path, "sending request");
        Ok(self.transport.execute(request)?)
    }

    fn round_trip(&self, request: &HttpRequest) -> Result<Value, ApiError> {
        let response = self.execute(request)?;
        self.handle_response(response)
    }

    fn get(&self, endpoint: &str, token: Option<&str>) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: format!("{}{endpoint}", self.base_url),
            headers: headers(token),
            body: None,
        }
    }

    fn post<B: Serialize>(
        &self,
        endpoint: &str,
        token: Option<&str>,
        payload: &B,
    ) -> Result<HttpRequest, ApiError> {
        let body =
            serde_json::to_string(payload).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: format!("{}{endpoint}", self.base_url),
            headers: headers(token),
            body: Some(body),
        })
    }
}

fn headers(token: Option<&str>) -> Vec<(String, String)> {
    let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
    if let Some(token) = token {
        headers.push(("authorization".to_string(), format!("Bearer {token}")));
    }
    headers
}

/// Parse a body as JSON, reading anything unparsable (including "") as `{}`.
fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "response body is not JSON, using empty object");
        Value::Object(serde_json::Map::new())
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::session::{FileSessionStore, MemorySessionStore};
    use crate::transport::TransportError;

    /// Replays queued responses and records every request it was given.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn reply(self, status: u16, body: &str) -> Self {
            self.responses.lock().unwrap().push_back(Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }));
            self
        }

        fn fail(self, message: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(TransportError(message.to_string())));
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left")
        }
    }

    fn client(transport: ScriptedTransport) -> ApiClient<ScriptedTransport, MemorySessionStore> {
        ApiClient::new(
            &ClientConfig::new("http://localhost:3000"),
            transport,
            MemorySessionStore::new(),
        )
    }

    fn seed_session(store: &MemorySessionStore) {
        store.set(SessionKey::Username, "ash").unwrap();
        store.set(SessionKey::Token, "A0").unwrap();
        store.set(SessionKey::Refresh, "R0").unwrap();
    }

    fn stored(store: &MemorySessionStore, key: SessionKey) -> Option<String> {
        store.get(key).unwrap()
    }

    fn body(request: &HttpRequest) -> Value {
        serde_json::from_str(request.body.as_deref().unwrap()).unwrap()
    }

    // --- builders ---

    #[test]
    fn build_update_team_is_authenticated_post() {
        let c = client(ScriptedTransport::default());
        let req = c.build_update_team("tok", 25, TeamAction::Add).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/api/users/update_team/");
        assert_eq!(req.header("authorization"), Some("Bearer tok"));
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(body(&req), json!({"pokemon_id": 25, "action": "add"}));
    }

    #[test]
    fn build_login_has_no_authorization() {
        let c = client(ScriptedTransport::default());
        let req = c.build_login("ash", "pikachu123").unwrap();
        assert_eq!(req.path, "http://localhost:3000/api/users/login/");
        assert_eq!(req.header("authorization"), None);
        assert_eq!(body(&req), json!({"username": "ash", "password": "pikachu123"}));
    }

    #[test]
    fn build_get_leaderboard_defaults_to_all() {
        let c = client(ScriptedTransport::default());
        let req = c.build_get_leaderboard(None);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.path,
            "http://localhost:3000/api/users/leaderboard/?difficulty=all"
        );
        assert!(req.body.is_none());
    }

    #[test]
    fn build_get_leaderboard_encodes_difficulty() {
        let c = client(ScriptedTransport::default());
        let req = c.build_get_leaderboard(Some("very hard&x=1"));
        assert_eq!(
            req.path,
            "http://localhost:3000/api/users/leaderboard/?difficulty=very+hard%26x%3D1"
        );
    }

    // --- shared response handler ---

    #[test]
    fn non_json_body_reads_as_empty_object() {
        let c = client(ScriptedTransport::default());
        let data = c
            .handle_response(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: "<html>ok</html>".to_string(),
            })
            .unwrap();
        assert_eq!(data, json!({}));
    }

    #[test]
    fn error_message_comes_from_body() {
        let c = client(ScriptedTransport::default());
        let err = c
            .handle_response(HttpResponse {
                status: 400,
                headers: Vec::new(),
                body: r#"{"error":"Team is full"}"#.to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 400, .. }));
        assert_eq!(err.to_string(), "Team is full");
    }

    #[test]
    fn error_message_falls_back_to_status() {
        let c = client(ScriptedTransport::default());
        let err = c
            .handle_response(HttpResponse {
                status: 502,
                headers: Vec::new(),
                body: "Bad Gateway".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 502");
    }

    #[test]
    fn unauthorized_clears_tokens() {
        let c = client(ScriptedTransport::default().reply(401, r#"{"error":"Token expired"}"#));
        seed_session(c.store());

        let err = c.get_team("A0").unwrap_err();

        assert!(matches!(err, ApiError::AuthExpired { .. }));
        assert!(err.to_string().contains("authentication failed"));
        assert_eq!(stored(c.store(), SessionKey::Token), None);
        assert_eq!(stored(c.store(), SessionKey::Refresh), None);
        assert_eq!(stored(c.store(), SessionKey::Username).as_deref(), Some("ash"));
    }

    #[test]
    fn non_401_failure_keeps_tokens() {
        let c = client(ScriptedTransport::default().reply(500, ""));
        seed_session(c.store());

        c.get_team("A0").unwrap_err();

        assert_eq!(stored(c.store(), SessionKey::Token).as_deref(), Some("A0"));
        assert_eq!(stored(c.store(), SessionKey::Refresh).as_deref(), Some("R0"));
    }

    // --- operations ---

    #[test]
    fn update_team_without_token_sends_nothing() {
        let c = client(ScriptedTransport::default());
        let err = c.update_team("", 25, TeamAction::Add).unwrap_err();
        assert!(matches!(err, ApiError::AuthRequired));
        assert!(c.transport.requests().is_empty());
    }

    #[test]
    fn update_team_returns_body() {
        let c = client(ScriptedTransport::default().reply(200, r#"{"team":[25]}"#));
        let data = c.update_team("A0", 25, TeamAction::Add).unwrap();
        assert_eq!(data, json!({"team": [25]}));
        assert_eq!(c.transport.requests().len(), 1);
    }

    #[test]
    fn get_team_propagates_transport_error() {
        let c = client(ScriptedTransport::default().fail("connection refused"));
        let err = c.get_team("A0").unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[test]
    fn login_persists_session() {
        let c = client(ScriptedTransport::default().reply(200, r#"{"access":"A1","refresh":"R1"}"#));

        let data = c.login("ash", "pikachu123").unwrap();

        assert_eq!(data["access"], "A1");
        assert_eq!(stored(c.store(), SessionKey::Username).as_deref(), Some("ash"));
        assert_eq!(stored(c.store(), SessionKey::Token).as_deref(), Some("A1"));
        assert_eq!(stored(c.store(), SessionKey::Refresh).as_deref(), Some("R1"));
    }

    #[test]
    fn login_without_access_token_stores_nothing() {
        let c = client(ScriptedTransport::default().reply(200, r#"{"detail":"mfa required"}"#));

        c.login("ash", "pikachu123").unwrap();

        assert_eq!(stored(c.store(), SessionKey::Username), None);
        assert_eq!(stored(c.store(), SessionKey::Token), None);
    }

    #[test]
    fn login_failure_is_masked() {
        let c = client(ScriptedTransport::default().reply(400, r#"{"error":"Invalid credentials"}"#));

        let err = c.login("ash", "wrong").unwrap_err();

        assert!(matches!(err, ApiError::LoginFailed(_)));
        assert_eq!(err.to_string(), "Login failed");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn signup_failure_is_masked() {
        let c = client(ScriptedTransport::default().fail("connection refused"));
        let err = c.signup("ash", "ash@example.com", "pikachu123").unwrap_err();
        assert_eq!(err.to_string(), "Sign up failed");
        assert!(matches!(
            err,
            ApiError::SignupFailed(ref inner) if matches!(**inner, ApiError::Transport(_))
        ));
    }

    #[test]
    fn logout_success_clears_tokens() {
        let c = client(ScriptedTransport::default().reply(205, ""));
        seed_session(c.store());

        let data = c.logout("R0").unwrap();

        assert_eq!(data, json!({}));
        assert_eq!(stored(c.store(), SessionKey::Token), None);
        assert_eq!(stored(c.store(), SessionKey::Refresh), None);
        let requests = c.transport.requests();
        assert_eq!(body(&requests[0]), json!({"refresh": "R0"}));
    }

    #[test]
    fn logout_failure_keeps_tokens_and_is_masked() {
        let c = client(ScriptedTransport::default().reply(400, r#"{"error":"Invalid token"}"#));
        seed_session(c.store());

        let err = c.logout("R0").unwrap_err();

        assert_eq!(err.to_string(), "Logout failed");
        assert_eq!(stored(c.store(), SessionKey::Token).as_deref(), Some("A0"));
    }

    #[test]
    fn update_high_score_error_is_not_masked() {
        let c = client(ScriptedTransport::default().reply(400, r#"{"error":"Invalid difficulty"}"#));
        let err = c.update_high_score("A0", "nightmare", 10).unwrap_err();
        assert_eq!(err.to_string(), "Invalid difficulty");
        let requests = c.transport.requests();
        assert_eq!(body(&requests[0]), json!({"difficulty": "nightmare", "score": 10}));
    }

    #[test]
    fn get_leaderboard_returns_body() {
        let c = client(ScriptedTransport::default().reply(200, r#"{"leaderboard":[]}"#));
        let data = c.get_leaderboard(Some("easy")).unwrap();
        assert_eq!(data, json!({"leaderboard": []}));
        assert!(c.transport.requests()[0].path.ends_with("?difficulty=easy"));
    }

    #[test]
    fn truncated_session_file_does_not_block_login_or_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{\n  \"token\": \"A").unwrap();
        let transport = ScriptedTransport::default()
            .reply(200, r#"{"access":"A1","refresh":"R1"}"#)
            .reply(401, r#"{"error":"Token expired"}"#);
        let c = ApiClient::new(
            &ClientConfig::new("http://localhost:3000"),
            transport,
            FileSessionStore::new(&path),
        );

        c.login("ash", "pikachu123").unwrap();
        assert_eq!(c.store().get(SessionKey::Token).unwrap().as_deref(), Some("A1"));

        let err = c.get_team("A1").unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired { .. }));
        assert_eq!(c.store().get(SessionKey::Token).unwrap(), None);
        assert_eq!(c.store().get(SessionKey::Username).unwrap().as_deref(), Some("ash"));
    }
}
