//! In-process tracker backend for integration tests.
//!
//! Serves the REST routes the client uses plus a `/ws` endpoint that checks
//! the token and fans out pushed frames, bound to an ephemeral port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};

use trellis::models::{Board, Column, Comment, Project, Ticket, TicketStatus, User};

pub const EMAIL: &str = "a@b.com";
pub const PASSWORD: &str = "pw";
pub const SEED_COLUMN: i64 = 3;

struct Account {
    user: User,
    password: String,
}

struct Data {
    accounts: Vec<Account>,
    tokens: HashMap<String, i64>,
    next_token: u64,
    projects: Vec<Project>,
    boards: Vec<Board>,
    tickets: Vec<Ticket>,
    next_ticket_id: i64,
    next_comment_id: i64,
    omit_user_in_auth: bool,
}

pub struct BackendState {
    data: Mutex<Data>,
    push: broadcast::Sender<String>,
    ws_active: AtomicUsize,
    ws_tokens: Mutex<Vec<String>>,
    fail_next_reads: AtomicUsize,
    ticket_list_hits: AtomicUsize,
    fail_next_profiles: AtomicUsize,
    profile_hits: AtomicUsize,
}

fn user(id: i64, username: &str, email: &str) -> User {
    User {
        id,
        username: username.to_string(),
        email: email.to_string(),
        role: "admin".to_string(),
        created_at: Some("2025-01-02T10:00:00".to_string()),
        updated_at: None,
    }
}

fn seed_ticket(id: i64, title: &str, column_id: i64) -> Ticket {
    Ticket {
        id,
        title: title.to_string(),
        description: Some(String::new()),
        owner_id: Some(1),
        column_id,
        status: TicketStatus::Open,
        priority: Default::default(),
        created_at: Some("2025-01-02T10:00:00".to_string()),
        updated_at: Some("2025-01-02T10:00:00".to_string()),
        comments: Vec::new(),
    }
}

impl BackendState {
    fn seeded() -> Self {
        let ada = user(1, "ada", EMAIL);
        let data = Data {
            accounts: vec![Account {
                user: ada.clone(),
                password: PASSWORD.to_string(),
            }],
            tokens: HashMap::new(),
            next_token: 1,
            projects: vec![Project {
                id: 1,
                name: "Apollo".to_string(),
                description: Some("Launch tracker".to_string()),
                created_at: Some("2025-01-01T00:00:00".to_string()),
                updated_at: None,
                users: vec![ada],
            }],
            boards: vec![Board {
                id: 1,
                name: "Main".to_string(),
                project_id: 1,
                columns: vec![
                    Column {
                        id: SEED_COLUMN,
                        name: "Todo".to_string(),
                        board_id: 1,
                        tickets: Vec::new(),
                    },
                    Column {
                        id: 4,
                        name: "Done".to_string(),
                        board_id: 1,
                        tickets: Vec::new(),
                    },
                ],
            }],
            tickets: vec![
                seed_ticket(1, "Seed ticket", SEED_COLUMN),
                seed_ticket(2, "Second ticket", 4),
            ],
            next_ticket_id: 3,
            next_comment_id: 1,
            omit_user_in_auth: false,
        };
        let (push, _) = broadcast::channel(64);
        Self {
            data: Mutex::new(data),
            push,
            ws_active: AtomicUsize::new(0),
            ws_tokens: Mutex::new(Vec::new()),
            fail_next_reads: AtomicUsize::new(0),
            ticket_list_hits: AtomicUsize::new(0),
            fail_next_profiles: AtomicUsize::new(0),
            profile_hits: AtomicUsize::new(0),
        }
    }

    fn authenticate(&self, headers: &HeaderMap) -> Option<User> {
        let token = headers
            .get("authorization")?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.user_for_token(token)
    }

    fn user_for_token(&self, token: &str) -> Option<User> {
        let data = self.data.lock().unwrap();
        let id = *data.tokens.get(token)?;
        data.accounts
            .iter()
            .find(|a| a.user.id == id)
            .map(|a| a.user.clone())
    }

    fn issue_token(&self, user_id: i64) -> String {
        let mut data = self.data.lock().unwrap();
        let token = format!("t{}", data.next_token);
        data.next_token += 1;
        data.tokens.insert(token.clone(), user_id);
        token
    }

    fn auth_body(&self, account_user: User, token: String) -> Value {
        if self.data.lock().unwrap().omit_user_in_auth {
            json!({"access_token": token, "token_type": "bearer"})
        } else {
            json!({"access_token": token, "token_type": "bearer", "user": account_user})
        }
    }

    fn board_with_tickets(&self, board: &Board) -> Board {
        let data = self.data.lock().unwrap();
        let mut board = board.clone();
        for column in &mut board.columns {
            column.tickets = data
                .tickets
                .iter()
                .filter(|t| t.column_id == column.id)
                .cloned()
                .collect();
        }
        board
    }

    fn take_forced_failure(&self) -> bool {
        take_one(&self.fail_next_reads)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn error(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({"detail": detail}))).into_response()
}

fn unauthorized() -> Response {
    error(StatusCode::UNAUTHORIZED, "Could not validate credentials")
}

type Shared = State<Arc<BackendState>>;

async fn login(State(state): Shared, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let found = {
        let data = state.data.lock().unwrap();
        data.accounts
            .iter()
            .find(|a| a.user.email == email && a.password == password)
            .map(|a| a.user.clone())
    };
    match found {
        Some(user) => {
            let token = state.issue_token(user.id);
            Json(state.auth_body(user, token)).into_response()
        }
        None => error(StatusCode::BAD_REQUEST, "Incorrect email or password"),
    }
}

async fn register(State(state): Shared, Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default().to_string();
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();

    let created = {
        let mut data = state.data.lock().unwrap();
        if data.accounts.iter().any(|a| a.user.email == email) {
            None
        } else {
            let id = data.accounts.len() as i64 + 1;
            let user = user(id, &username, &email);
            data.accounts.push(Account {
                user: user.clone(),
                password,
            });
            Some(user)
        }
    };
    match created {
        Some(user) => {
            let token = state.issue_token(user.id);
            Json(state.auth_body(user, token)).into_response()
        }
        None => error(StatusCode::BAD_REQUEST, "Email already registered"),
    }
}

async fn get_profile(State(state): Shared, headers: HeaderMap) -> Response {
    state.profile_hits.fetch_add(1, Ordering::SeqCst);
    if take_one(&state.fail_next_profiles) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "Temporarily unavailable");
    }
    match state.authenticate(&headers) {
        Some(user) => Json(user).into_response(),
        None => unauthorized(),
    }
}

async fn put_profile(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let Some(current) = state.authenticate(&headers) else {
        return unauthorized();
    };
    let mut data = state.data.lock().unwrap();
    let Some(account) = data.accounts.iter_mut().find(|a| a.user.id == current.id) else {
        return error(StatusCode::NOT_FOUND, "User not found");
    };
    if let Some(username) = body["username"].as_str() {
        account.user.username = username.to_string();
    }
    if let Some(email) = body["email"].as_str() {
        account.user.email = email.to_string();
    }
    Json(account.user.clone()).into_response()
}

async fn request_reset(Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    Json(json!({"reset_token": format!("reset-{}", email)})).into_response()
}

async fn reset_password(Json(body): Json<Value>) -> Response {
    let token = body["token"].as_str().unwrap_or_default();
    if token.starts_with("reset-") {
        Json(json!({"message": "Password has been reset"})).into_response()
    } else {
        error(StatusCode::BAD_REQUEST, "Invalid or expired token")
    }
}

async fn list_projects(State(state): Shared, headers: HeaderMap) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    Json(state.data.lock().unwrap().projects.clone()).into_response()
}

async fn create_project(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let Some(owner) = state.authenticate(&headers) else {
        return unauthorized();
    };
    let mut data = state.data.lock().unwrap();
    let project = Project {
        id: data.projects.len() as i64 + 1,
        name: body["name"].as_str().unwrap_or_default().to_string(),
        description: body["description"].as_str().map(str::to_string),
        created_at: Some("2025-02-01T00:00:00".to_string()),
        updated_at: None,
        users: vec![owner],
    };
    data.projects.push(project.clone());
    (StatusCode::CREATED, Json(project)).into_response()
}

async fn get_project(State(state): Shared, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    let data = state.data.lock().unwrap();
    match data.projects.iter().find(|p| p.id == id) {
        Some(project) => Json(project.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "Project not found"),
    }
}

async fn put_project_settings(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    let mut data = state.data.lock().unwrap();
    let Some(project) = data.projects.iter_mut().find(|p| p.id == id) else {
        return error(StatusCode::NOT_FOUND, "Project not found");
    };
    if let Some(name) = body["name"].as_str() {
        project.name = name.to_string();
    }
    if let Some(description) = body["description"].as_str() {
        project.description = Some(description.to_string());
    }
    Json(project.clone()).into_response()
}

async fn list_boards(State(state): Shared, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    let boards: Vec<Board> = {
        let data = state.data.lock().unwrap();
        data.boards
            .iter()
            .filter(|b| b.project_id == id)
            .cloned()
            .collect()
    };
    let boards: Vec<Board> = boards.iter().map(|b| state.board_with_tickets(b)).collect();
    Json(boards).into_response()
}

async fn invite(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    let email = body["email"].as_str().unwrap_or_default();
    let project_id = body["project_id"].as_i64().unwrap_or_default();
    let data = state.data.lock().unwrap();
    let Some(project) = data.projects.iter().find(|p| p.id == project_id) else {
        return error(StatusCode::NOT_FOUND, "Project not found");
    };
    if project.users.iter().any(|u| u.email == email) {
        return error(StatusCode::BAD_REQUEST, "User is already a member of this project");
    }
    Json(json!({"message": "Invitation sent"})).into_response()
}

async fn accept_invitation(State(state): Shared, headers: HeaderMap, Path(token): Path<String>) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    if token == "accept-me" {
        Json(json!({"message": "Invitation accepted"})).into_response()
    } else {
        error(StatusCode::NOT_FOUND, "Invitation not found")
    }
}

async fn list_tickets(State(state): Shared, Query(query): Query<HashMap<String, String>>) -> Response {
    state.ticket_list_hits.fetch_add(1, Ordering::SeqCst);
    if state.take_forced_failure() {
        return error(StatusCode::SERVICE_UNAVAILABLE, "Temporarily unavailable");
    }

    let data = state.data.lock().unwrap();
    let columns: Option<Vec<i64>> = query
        .get("project_id")
        .and_then(|p| p.parse::<i64>().ok())
        .map(|project_id| {
            data.boards
                .iter()
                .filter(|b| b.project_id == project_id)
                .flat_map(|b| b.columns.iter().map(|c| c.id))
                .collect()
        });
    let mut tickets: Vec<Ticket> = data
        .tickets
        .iter()
        .filter(|t| columns.as_ref().is_none_or(|cols| cols.contains(&t.column_id)))
        .cloned()
        .collect();
    if query.get("sort").map(String::as_str) == Some("updated_at") {
        tickets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }
    if let Some(limit) = query.get("limit").and_then(|l| l.parse::<usize>().ok()) {
        tickets.truncate(limit);
    }
    Json(tickets).into_response()
}

async fn create_ticket(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let owner = state.authenticate(&headers).map(|u| u.id);
    let mut data = state.data.lock().unwrap();
    let column_id = body["column_id"].as_i64().unwrap_or_default();
    if !data
        .boards
        .iter()
        .any(|b| b.columns.iter().any(|c| c.id == column_id))
    {
        return error(StatusCode::NOT_FOUND, "Column not found");
    }
    let id = data.next_ticket_id;
    data.next_ticket_id += 1;
    let ticket = Ticket {
        id,
        title: body["title"].as_str().unwrap_or_default().to_string(),
        description: body["description"].as_str().map(str::to_string),
        owner_id: owner,
        column_id,
        status: TicketStatus::Open,
        priority: Default::default(),
        created_at: Some(format!("2025-03-01T00:00:{:02}", id)),
        updated_at: Some(format!("2025-03-01T00:00:{:02}", id)),
        comments: Vec::new(),
    };
    data.tickets.push(ticket.clone());
    (StatusCode::CREATED, Json(ticket)).into_response()
}

async fn get_ticket(State(state): Shared, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    let data = state.data.lock().unwrap();
    match data.tickets.iter().find(|t| t.id == id) {
        Some(ticket) => Json(ticket.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "Ticket not found"),
    }
}

async fn update_ticket(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    let updated = {
        let mut data = state.data.lock().unwrap();
        let Some(ticket) = data.tickets.iter_mut().find(|t| t.id == id) else {
            return error(StatusCode::NOT_FOUND, "Ticket not found");
        };
        if let Some(title) = body["title"].as_str() {
            ticket.title = title.to_string();
        }
        if let Some(status) = body["status"].as_str().and_then(|s| s.parse().ok()) {
            ticket.status = status;
        }
        ticket.updated_at = Some("2025-04-01T00:00:00".to_string());
        ticket.clone()
    };
    let frame = json!({"event": "ticket_update", "data": updated}).to_string();
    let _ = state.push.send(frame);
    Json(updated).into_response()
}

async fn delete_ticket(State(state): Shared, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    let mut data = state.data.lock().unwrap();
    let before = data.tickets.len();
    data.tickets.retain(|t| t.id != id);
    if data.tickets.len() == before {
        return error(StatusCode::NOT_FOUND, "Ticket not found");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn ticket_history(State(state): Shared, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    Json(json!([{
        "id": 1,
        "ticket_id": id,
        "field_changed": "status",
        "old_value": "open",
        "new_value": "in-progress",
        "changed_by_id": 1,
        "changed_at": "2025-03-02T09:30:00"
    }]))
    .into_response()
}

async fn add_comment(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let Some(author) = state.authenticate(&headers) else {
        return unauthorized();
    };
    let mut data = state.data.lock().unwrap();
    let comment_id = data.next_comment_id;
    data.next_comment_id += 1;
    let Some(ticket) = data.tickets.iter_mut().find(|t| t.id == id) else {
        return error(StatusCode::NOT_FOUND, "Ticket not found");
    };
    let comment: Comment = serde_json::from_value(json!({
        "id": comment_id,
        "content": body["content"].as_str().unwrap_or_default(),
        "ticket_id": id,
        "author_id": author.id,
        "author": {"username": author.username},
        "created_at": "2025-03-03T12:00:00"
    }))
    .unwrap();
    ticket.comments.push(comment.clone());
    (StatusCode::CREATED, Json(comment)).into_response()
}

async fn ws_handler(
    State(state): Shared,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let token = query.get("token").cloned().unwrap_or_default();
    if state.user_for_token(&token).is_none() || state.authenticate(&headers).is_none() {
        return StatusCode::FORBIDDEN.into_response();
    }
    state.ws_tokens.lock().unwrap().push(token);
    upgrade.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: Arc<BackendState>, mut socket: WebSocket) {
    let mut push = state.push.subscribe();
    state.ws_active.fetch_add(1, Ordering::SeqCst);
    loop {
        tokio::select! {
            frame = push.recv() => match frame {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    state.ws_active.fetch_sub(1, Ordering::SeqCst);
}

fn router(state: Arc<BackendState>) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/register", post(register))
        .route("/api/profile", get(get_profile).put(put_profile))
        .route("/api/request-password-reset", post(request_reset))
        .route("/api/reset-password", post(reset_password))
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", get(get_project))
        .route(
            "/api/projects/{id}/settings",
            get(get_project).put(put_project_settings),
        )
        .route("/api/projects/{id}/boards", get(list_boards))
        .route("/api/invitations", post(invite))
        .route("/api/invitations/{token}", get(accept_invitation))
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route(
            "/api/tickets/{id}",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/api/tickets/{id}/history", get(ticket_history))
        .route("/api/tickets/{id}/comments", post(add_comment))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::seeded());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Issue a token for the seeded user without going through login.
    pub fn issue_token(&self) -> String {
        self.state.issue_token(1)
    }

    /// Invalidate every issued token; subsequent bearer requests get 401.
    pub fn revoke_all(&self) {
        self.state.data.lock().unwrap().tokens.clear();
    }

    pub fn omit_user_in_auth(&self) {
        self.state.data.lock().unwrap().omit_user_in_auth = true;
    }

    pub fn fail_next_reads(&self, n: usize) {
        self.state.fail_next_reads.store(n, Ordering::SeqCst);
    }

    /// Answer the next `n` profile requests with 503.
    pub fn fail_next_profiles(&self, n: usize) {
        self.state.fail_next_profiles.store(n, Ordering::SeqCst);
    }

    pub fn profile_hits(&self) -> usize {
        self.state.profile_hits.load(Ordering::SeqCst)
    }

    pub fn ticket_list_hits(&self) -> usize {
        self.state.ticket_list_hits.load(Ordering::SeqCst)
    }

    pub fn ws_active(&self) -> usize {
        self.state.ws_active.load(Ordering::SeqCst)
    }

    pub fn ws_tokens(&self) -> Vec<String> {
        self.state.ws_tokens.lock().unwrap().clone()
    }

    /// Send a raw text frame to every open socket.
    pub fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.state.push.send(frame.into());
    }

    pub fn push_ticket(&self, ticket: &Ticket) {
        self.push_frame(json!({"event": "ticket_update", "data": ticket}).to_string());
    }

    /// Wait until exactly `n` sockets are open.
    pub async fn wait_for_ws(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.ws_active() != n {
            if tokio::time::Instant::now() > deadline {
                panic!("expected {} open sockets, found {}", n, self.ws_active());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
