//! In-process fakes of the external APIs, served by Axum on a random port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const TRELLO_KEY: &str = "trello-key";
pub const TRELLO_TOKEN: &str = "trello-token";
pub const X_TOKEN: &str = "x-bearer";

#[derive(Debug, Clone)]
pub struct FakeCard {
    pub id: String,
    pub list_id: String,
    pub name: String,
    pub desc: String,
}

/// Recorded state of the fake Trello, X and Gemini APIs.
#[derive(Debug, Default)]
pub struct FakeState {
    pub boards: Vec<(String, String)>,
    /// (id, board_id, name)
    pub lists: Vec<(String, String, String)>,
    pub cards: Vec<FakeCard>,
    pub trello_requests: u32,
    pub boards_created: u32,
    /// Card names whose creation returns HTTP 500.
    pub failing_cards: Vec<String>,
    /// Posts served by the fake X search: (id, text, likes, retweets).
    pub posts: Vec<(String, String, u64, u64)>,
    pub x_requests: Vec<HashMap<String, String>>,
    pub gemini_requests: u32,
}

pub type Shared = Arc<Mutex<FakeState>>;

fn next_id(prefix: &str, n: usize) -> String {
    format!("{prefix}-{}", n + 1)
}

fn authorized(q: &HashMap<String, String>) -> bool {
    q.get("key").map(String::as_str) == Some(TRELLO_KEY)
        && q.get("token").map(String::as_str) == Some(TRELLO_TOKEN)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "invalid key").into_response()
}

// ── Trello ──────────────────────────────────────────────────────────

async fn member_boards(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let mut s = state.lock().unwrap();
    s.trello_requests += 1;
    if !authorized(&q) {
        return unauthorized();
    }
    let boards: Vec<Value> = s
        .boards
        .iter()
        .map(|(id, name)| json!({"id": id, "name": name}))
        .collect();
    Json(boards).into_response()
}

async fn create_board(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let mut s = state.lock().unwrap();
    s.trello_requests += 1;
    if !authorized(&q) {
        return unauthorized();
    }
    assert_eq!(q.get("defaultLists").map(String::as_str), Some("false"));
    let name = q.get("name").cloned().unwrap_or_default();
    let id = next_id("board", s.boards.len());
    s.boards.push((id.clone(), name.clone()));
    s.boards_created += 1;
    Json(json!({"id": id, "name": name})).into_response()
}

async fn board_lists(
    State(state): State<Shared>,
    Path(board_id): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let mut s = state.lock().unwrap();
    s.trello_requests += 1;
    if !authorized(&q) {
        return unauthorized();
    }
    let lists: Vec<Value> = s
        .lists
        .iter()
        .filter(|(_, b, _)| *b == board_id)
        .map(|(id, _, name)| json!({"id": id, "name": name}))
        .collect();
    Json(lists).into_response()
}

async fn create_list(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let mut s = state.lock().unwrap();
    s.trello_requests += 1;
    if !authorized(&q) {
        return unauthorized();
    }
    let name = q.get("name").cloned().unwrap_or_default();
    let board_id = q.get("idBoard").cloned().unwrap_or_default();
    let id = next_id("list", s.lists.len());
    s.lists.push((id.clone(), board_id, name.clone()));
    Json(json!({"id": id, "name": name})).into_response()
}

async fn create_card(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let mut s = state.lock().unwrap();
    s.trello_requests += 1;
    if !authorized(&q) {
        return unauthorized();
    }
    let name = q.get("name").cloned().unwrap_or_default();
    if s.failing_cards.contains(&name) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "card store down").into_response();
    }
    let card = FakeCard {
        id: next_id("card", s.cards.len()),
        list_id: q.get("idList").cloned().unwrap_or_default(),
        name,
        desc: q.get("desc").cloned().unwrap_or_default(),
    };
    s.cards.push(card.clone());
    Json(json!({
        "id": card.id,
        "name": card.name,
        "shortUrl": format!("https://trello.test/c/{}", card.id)
    }))
    .into_response()
}

// ── X ───────────────────────────────────────────────────────────────

async fn x_search(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let expected = format!("Bearer {X_TOKEN}");
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, "bad bearer").into_response();
    }
    let mut s = state.lock().unwrap();
    s.x_requests.push(q);
    if s.posts.is_empty() {
        return Json(json!({"meta": {"result_count": 0}})).into_response();
    }
    let data: Vec<Value> = s
        .posts
        .iter()
        .map(|(id, text, likes, retweets)| {
            json!({
                "id": id,
                "text": text,
                "lang": "en",
                "created_at": "2025-03-01T10:00:00.000Z",
                "public_metrics": {"like_count": likes, "retweet_count": retweets, "reply_count": 0}
            })
        })
        .collect();
    Json(json!({"data": data})).into_response()
}

// ── Gemini ──────────────────────────────────────────────────────────

/// Files a High bug card for any post mentioning a crash; skips the rest.
async fn gemini_generate(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.lock().unwrap().gemini_requests += 1;
    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default();
    let answer = if prompt.contains("crashes") {
        json!({
            "add": true,
            "card_name": "[Bug Report] App crashes on login",
            "priority": "High",
            "card_description": "Users report a crash on login."
        })
    } else {
        json!({"add": false, "reason": "not actionable"})
    };
    Json(json!({
        "responseId": "resp-1",
        "modelVersion": "gemini-2.0-flash",
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": format!("```json\n{answer}\n```")}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {
            "promptTokenCount": 50,
            "candidatesTokenCount": 20,
            "totalTokenCount": 70
        }
    }))
    .into_response()
}

/// Router serving all three fakes.
pub fn fake_router(state: Shared) -> Router {
    Router::new()
        .route("/1/members/me/boards", get(member_boards))
        .route("/1/boards", post(create_board))
        .route("/1/boards/{id}/lists", get(board_lists))
        .route("/1/lists", post(create_list))
        .route("/1/cards", post(create_card))
        .route("/2/tweets/search/recent", get(x_search))
        .route("/v1beta/models/{model}", post(gemini_generate))
        .with_state(state)
}

/// Start the fakes on a random port. Returns the base URL and shared state.
pub async fn start_fakes() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeState::default()));
    let app = fake_router(Arc::clone(&state));
    let base = serve(app).await;
    (base, state)
}

/// Serve a router on 127.0.0.1 with a random port; return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}
