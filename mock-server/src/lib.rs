//! In-memory stand-in for the trainer backend's `/api/users` routes.
//!
//! Accounts, sessions, teams and high scores live in one `RwLock`ed struct
//! and vanish with the process. Error bodies are `{"error": "..."}`, the shape
//! the client reads its messages from.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const MAX_TEAM_SIZE: usize = 6;
pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "hard"];

#[derive(Debug, Clone)]
struct User {
    id: u64,
    email: String,
    password: String,
    team: Vec<u32>,
    high_scores: BTreeMap<String, u64>,
}

#[derive(Debug, Clone)]
struct Session {
    username: String,
    access: String,
}

#[derive(Debug, Default)]
pub struct Backend {
    users: HashMap<String, User>,
    next_id: u64,
    // access token -> username
    access: HashMap<String, String>,
    // refresh token -> session
    sessions: HashMap<String, Session>,
}

pub type Db = Arc<RwLock<Backend>>;

#[derive(Debug, Deserialize)]
pub struct Register {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Logout {
    #[serde(default)]
    pub refresh: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamAction {
    Add,
    Remove,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeam {
    pub pokemon_id: u32,
    pub action: TeamAction,
}

#[derive(Debug, Deserialize)]
pub struct UpdateHighScore {
    pub difficulty: String,
    pub score: u64,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "all_difficulties")]
    pub difficulty: String,
}

fn all_difficulties() -> String {
    "all".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub difficulty: String,
    pub score: u64,
}

/// A non-2xx reply with an `{"error": ...}` body.
#[derive(Debug)]
pub struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type Reply = Result<(StatusCode, Json<Value>), Failure>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Backend::default()));
    let users = Router::new()
        .route("/register/", post(register))
        .route("/login/", post(login))
        .route("/logout/", post(logout))
        .route("/team/", get(team))
        .route("/update_team/", post(update_team))
        .route("/update_high_score/", post(update_high_score))
        .route("/leaderboard/", get(leaderboard));
    Router::new().nest("/api/users", users).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the bearer token to a username.
fn authenticate(backend: &Backend, headers: &HeaderMap) -> Result<String, Failure> {
    let token = bearer(headers)
        .ok_or_else(|| Failure::unauthorized("Authentication credentials were not provided"))?;
    backend
        .access
        .get(token)
        .cloned()
        .ok_or_else(|| Failure::unauthorized("Token is invalid or expired"))
}

async fn register(State(db): State<Db>, Json(input): Json<Register>) -> Reply {
    if input.username.is_empty() || input.email.is_empty() || input.password.is_empty() {
        return Err(Failure::bad_request("username, email and password are required"));
    }
    let mut backend = db.write().await;
    if backend.users.contains_key(&input.username) {
        return Err(Failure::bad_request("A user with that username already exists"));
    }
    backend.next_id += 1;
    let id = backend.next_id;
    backend.users.insert(
        input.username.clone(),
        User {
            id,
            email: input.email.clone(),
            password: input.password,
            team: Vec::new(),
            high_scores: BTreeMap::new(),
        },
    );
    tracing::info!(username = %input.username, id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "username": input.username, "email": input.email })),
    ))
}

async fn login(State(db): State<Db>, Json(input): Json<Login>) -> Reply {
    let mut backend = db.write().await;
    let profile = backend
        .users
        .get(&input.username)
        .filter(|user| user.password == input.password)
        .map(|user| json!({ "id": user.id, "username": input.username, "email": user.email }))
        .ok_or_else(|| Failure::unauthorized("Invalid credentials"))?;
    let access = Uuid::new_v4().simple().to_string();
    let refresh = Uuid::new_v4().simple().to_string();
    backend.access.insert(access.clone(), input.username.clone());
    backend.sessions.insert(
        refresh.clone(),
        Session {
            username: input.username.clone(),
            access: access.clone(),
        },
    );
    tracing::info!(username = %input.username, "session issued");
    Ok((
        StatusCode::OK,
        Json(json!({ "access": access, "refresh": refresh, "user": profile })),
    ))
}

async fn logout(State(db): State<Db>, Json(input): Json<Logout>) -> Reply {
    let mut backend = db.write().await;
    let session = backend
        .sessions
        .remove(&input.refresh)
        .ok_or_else(|| Failure::bad_request("Invalid refresh token"))?;
    backend.access.remove(&session.access);
    tracing::info!(username = %session.username, "session revoked");
    Ok((StatusCode::OK, Json(json!({ "message": "Logged out" }))))
}

async fn team(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let backend = db.read().await;
    let username = authenticate(&backend, &headers)?;
    let team = backend
        .users
        .get(&username)
        .map(|user| user.team.clone())
        .unwrap_or_default();
    Ok((StatusCode::OK, Json(json!({ "team": team }))))
}

async fn update_team(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<UpdateTeam>,
) -> Reply {
    let mut backend = db.write().await;
    let username = authenticate(&backend, &headers)?;
    let user = backend
        .users
        .get_mut(&username)
        .ok_or_else(|| Failure::unauthorized("User no longer exists"))?;

    match input.action {
        TeamAction::Add => {
            if user.team.contains(&input.pokemon_id) {
                return Err(Failure::bad_request("Pokemon is already on the team"));
            }
            if user.team.len() >= MAX_TEAM_SIZE {
                return Err(Failure::bad_request("Team is full"));
            }
            user.team.push(input.pokemon_id);
        }
        TeamAction::Remove => {
            let position = user
                .team
                .iter()
                .position(|id| *id == input.pokemon_id)
                .ok_or_else(|| Failure::bad_request("Pokemon is not on the team"))?;
            user.team.remove(position);
        }
    }
    Ok((StatusCode::OK, Json(json!({ "team": user.team }))))
}

async fn update_high_score(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<UpdateHighScore>,
) -> Reply {
    if !DIFFICULTIES.contains(&input.difficulty.as_str()) {
        return Err(Failure::bad_request("Invalid difficulty"));
    }
    let mut backend = db.write().await;
    let username = authenticate(&backend, &headers)?;
    let user = backend
        .users
        .get_mut(&username)
        .ok_or_else(|| Failure::unauthorized("User no longer exists"))?;

    let best = user.high_scores.entry(input.difficulty.clone()).or_insert(0);
    let updated = input.score > *best;
    if updated {
        *best = input.score;
    }
    Ok((
        StatusCode::OK,
        Json(json!({
            "difficulty": input.difficulty,
            "high_score": *best,
            "updated": updated,
        })),
    ))
}

async fn leaderboard(State(db): State<Db>, Query(query): Query<LeaderboardQuery>) -> Reply {
    let all = query.difficulty == "all";
    if !all && !DIFFICULTIES.contains(&query.difficulty.as_str()) {
        return Err(Failure::bad_request("Invalid difficulty"));
    }
    let backend = db.read().await;
    let mut entries: Vec<LeaderboardEntry> = backend
        .users
        .iter()
        .flat_map(|(username, user)| {
            user.high_scores
                .iter()
                .map(move |(difficulty, score)| LeaderboardEntry {
                    username: username.clone(),
                    difficulty: difficulty.clone(),
                    score: *score,
                })
        })
        .filter(|entry| all || entry.difficulty == query.difficulty)
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.username.cmp(&b.username)));
    Ok((
        StatusCode::OK,
        Json(json!({ "difficulty": query.difficulty, "leaderboard": entries })),
    ))
}
