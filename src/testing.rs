//! Test fixtures: an in-memory backend and an in-process mock server.

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

use crate::api::{
    ApiClientConfig, ApiError, ApiResult, AuthToken, LikeResponse, LikeStatus, LoginCredentials,
    OptionId, Poll, PollBackend, PollCreate, PollDetail, PollId, PollList, PollOption,
    RegisterData, User, VoteResponse, VoteStatus,
};
use crate::realtime::{
    ConnectedPayload, EventBus, InboundEvent, LikeUpdatePayload, PollCreatedPayload,
    VoteUpdatePayload,
};
use crate::session::CredentialSlot;

pub fn sample_user() -> User {
    User {
        id: 1,
        email: "viewer@example.com".to_string(),
        username: Some("viewer".to_string()),
        full_name: Some("Poll Viewer".to_string()),
        profile_picture: None,
        oauth_provider: None,
        is_active: true,
        is_verified: true,
        created_at: Utc::now(),
        last_login: None,
    }
}

// ============================================
// FakeBackend
// ============================================

#[derive(Default)]
struct FakeState {
    polls: BTreeMap<PollId, PollDetail>,
    votes: HashMap<PollId, OptionId>,
    likes: HashSet<PollId>,
    next_poll_id: PollId,
    next_option_id: OptionId,
    next_record_id: i64,
}

/// In-memory [`PollBackend`] for a single viewer, with failure injection
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    credentials: CredentialSlot,
    bus: Option<Arc<EventBus>>,
    fail_network: AtomicBool,
    fail_likes: AtomicBool,
    fail_votes: AtomicBool,
    fail_reads: AtomicBool,
    like_gate: Mutex<Option<Arc<Semaphore>>>,
    vote_gate: Mutex<Option<Arc<Semaphore>>>,
    list_delays: Mutex<VecDeque<Duration>>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl FakeBackend {
    pub const VALID_TOKEN: &'static str = "valid-token";

    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the push event the real server would send after each write
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            bus: Some(bus),
            ..Self::default()
        }
    }

    pub fn credentials(&self) -> CredentialSlot {
        self.credentials.clone()
    }

    pub fn fail_network(&self, fail: bool) {
        self.fail_network.store(fail, Ordering::SeqCst);
    }

    pub fn fail_likes(&self, fail: bool) {
        self.fail_likes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_votes(&self, fail: bool) {
        self.fail_votes.store(fail, Ordering::SeqCst);
    }

    /// Make status reads (vote/like status, detail, list) fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Hold like/unlike calls until permits are added to the returned gate
    pub fn hold_likes(&self) -> Arc<Semaphore> {
        Self::install_gate(&self.like_gate)
    }

    /// Hold vote submissions until permits are added to the returned gate
    pub fn hold_votes(&self) -> Arc<Semaphore> {
        Self::install_gate(&self.vote_gate)
    }

    fn install_gate(slot: &Mutex<Option<Arc<Semaphore>>>) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *slot.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Delay successive list calls by the given amounts
    pub fn delay_lists(&self, delays: impl IntoIterator<Item = Duration>) {
        self.list_delays.lock().unwrap().extend(delays);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Insert a poll directly, bypassing validation and events
    pub fn seed_poll(&self, title: &str, options: &[&str]) -> PollDetail {
        self.insert_poll(&PollCreate {
            title: title.to_string(),
            description: None,
            options: options.iter().map(|o| o.to_string()).collect(),
        })
    }

    /// Pretend another viewer liked a poll
    pub fn external_like(&self, poll_id: PollId) {
        if let Some(poll) = self.state.lock().unwrap().polls.get_mut(&poll_id) {
            poll.poll.total_likes += 1;
        }
    }

    fn insert_poll(&self, create: &PollCreate) -> PollDetail {
        let mut state = self.state.lock().unwrap();
        state.next_poll_id += 1;
        let id = state.next_poll_id;

        let mut options = Vec::new();
        for text in &create.options {
            state.next_option_id += 1;
            options.push(PollOption {
                id: state.next_option_id,
                option_text: text.clone(),
                vote_count: 0,
            });
        }

        let detail = PollDetail {
            poll: Poll {
                id,
                title: create.title.clone(),
                description: create.description.clone(),
                created_by: "fake-session".to_string(),
                created_at: Utc::now(),
                total_votes: 0,
                total_likes: 0,
            },
            options,
            user_voted: false,
            user_liked: false,
        };
        state.polls.insert(id, detail.clone());
        detail
    }

    fn check_network(&self) -> ApiResult<()> {
        if self.fail_network.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_reads(&self) -> ApiResult<()> {
        self.check_network()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected {
                status: 500,
                detail: "Internal Server Error".to_string(),
            });
        }
        Ok(())
    }

    fn unauthorized<T>(&self) -> ApiResult<T> {
        self.credentials.reject(self.credentials.bearer());
        Err(ApiError::Unauthorized)
    }

    fn not_found(what: &str) -> ApiError {
        ApiError::Rejected {
            status: 404,
            detail: format!("{} not found", what),
        }
    }

    fn publish(&self, event: InboundEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }

    async fn pass_gate(slot: &Mutex<Option<Arc<Semaphore>>>) {
        let gate = slot.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn token(&self, user: User) -> AuthToken {
        AuthToken {
            access_token: Self::VALID_TOKEN.to_string(),
            token_type: "bearer".to_string(),
            user,
        }
    }
}

#[async_trait]
impl PollBackend for FakeBackend {
    async fn list_polls(&self, page: u32, page_size: u32) -> ApiResult<PollList> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.list_delays.lock().unwrap().pop_front();
        self.check_reads()?;

        // Snapshot at issue time, respond after the delay
        let list = {
            let state = self.state.lock().unwrap();
            let page = page.max(1);
            let polls: Vec<Poll> = state
                .polls
                .values()
                .rev()
                .skip(((page - 1) * page_size) as usize)
                .take(page_size as usize)
                .map(|d| d.poll.clone())
                .collect();
            PollList {
                polls,
                total: state.polls.len() as u64,
                page,
                page_size,
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(list)
    }

    async fn get_poll(&self, poll_id: PollId) -> ApiResult<PollDetail> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        let mut detail = state
            .polls
            .get(&poll_id)
            .cloned()
            .ok_or_else(|| Self::not_found("Poll"))?;
        detail.user_voted = state.votes.contains_key(&poll_id);
        detail.user_liked = state.likes.contains(&poll_id);
        Ok(detail)
    }

    async fn create_poll(&self, poll: &PollCreate) -> ApiResult<PollDetail> {
        self.check_network()?;
        let detail = self.insert_poll(poll);
        self.publish(InboundEvent::PollCreated(PollCreatedPayload {
            id: Some(detail.id()),
            title: Some(detail.poll.title.clone()),
        }));
        Ok(detail)
    }

    async fn submit_vote(&self, poll_id: PollId, option_id: OptionId) -> ApiResult<VoteResponse> {
        Self::pass_gate(&self.vote_gate).await;
        self.check_network()?;
        if self.fail_votes.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection reset".to_string()));
        }

        let (response, event) = {
            let mut state = self.state.lock().unwrap();
            if !state.polls.contains_key(&poll_id) {
                return Err(Self::not_found("Poll"));
            }
            if state.votes.contains_key(&poll_id) {
                return Err(ApiError::Rejected {
                    status: 400,
                    detail: "You have already voted on this poll".to_string(),
                });
            }

            let poll = state.polls.get_mut(&poll_id).ok_or_else(|| Self::not_found("Poll"))?;
            let option = poll
                .options
                .iter_mut()
                .find(|o| o.id == option_id)
                .ok_or_else(|| Self::not_found("Poll option"))?;
            option.vote_count += 1;
            let vote_count = option.vote_count;
            poll.poll.total_votes += 1;
            let total_votes = poll.poll.total_votes;

            state.votes.insert(poll_id, option_id);
            state.next_record_id += 1;

            let response = VoteResponse {
                id: state.next_record_id,
                poll_id,
                option_id,
                voted_at: Utc::now(),
                message: "Vote recorded successfully".to_string(),
            };
            let event = InboundEvent::VoteUpdate(VoteUpdatePayload {
                poll_id: Some(poll_id),
                option_id: Some(option_id),
                vote_count: Some(vote_count),
                total_votes: Some(total_votes),
            });
            (response, event)
        };

        self.publish(event);
        Ok(response)
    }

    async fn vote_status(&self, poll_id: PollId) -> ApiResult<VoteStatus> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        Ok(match state.votes.get(&poll_id) {
            Some(option_id) => VoteStatus {
                voted: true,
                option_id: Some(*option_id),
            },
            None => VoteStatus::not_voted(),
        })
    }

    async fn like(&self, poll_id: PollId) -> ApiResult<LikeResponse> {
        Self::pass_gate(&self.like_gate).await;
        self.check_network()?;
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection reset".to_string()));
        }

        let (response, total) = {
            let mut state = self.state.lock().unwrap();
            if state.likes.contains(&poll_id) {
                return Err(ApiError::Rejected {
                    status: 400,
                    detail: "You have already liked this poll".to_string(),
                });
            }
            let poll = state.polls.get_mut(&poll_id).ok_or_else(|| Self::not_found("Poll"))?;
            poll.poll.total_likes += 1;
            let total = poll.poll.total_likes;
            state.likes.insert(poll_id);
            state.next_record_id += 1;
            (
                LikeResponse {
                    id: state.next_record_id,
                    poll_id,
                    liked_at: Utc::now(),
                    message: "Poll liked successfully".to_string(),
                },
                total,
            )
        };

        self.publish(InboundEvent::LikeUpdate(LikeUpdatePayload {
            poll_id: Some(poll_id),
            total_likes: Some(total),
            action: Some("liked".to_string()),
        }));
        Ok(response)
    }

    async fn unlike(&self, poll_id: PollId) -> ApiResult<()> {
        Self::pass_gate(&self.like_gate).await;
        self.check_network()?;
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection reset".to_string()));
        }

        let total = {
            let mut state = self.state.lock().unwrap();
            if !state.likes.remove(&poll_id) {
                return Err(Self::not_found("Like"));
            }
            let poll = state.polls.get_mut(&poll_id).ok_or_else(|| Self::not_found("Poll"))?;
            poll.poll.total_likes = poll.poll.total_likes.saturating_sub(1);
            poll.poll.total_likes
        };

        self.publish(InboundEvent::LikeUpdate(LikeUpdatePayload {
            poll_id: Some(poll_id),
            total_likes: Some(total),
            action: Some("unliked".to_string()),
        }));
        Ok(())
    }

    async fn like_status(&self, poll_id: PollId) -> ApiResult<LikeStatus> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        Ok(LikeStatus {
            liked: state.likes.contains(&poll_id),
        })
    }

    async fn register(&self, data: &RegisterData) -> ApiResult<AuthToken> {
        self.check_network()?;
        let mut user = sample_user();
        user.id = 2;
        user.email = data.email.clone();
        user.username = data.username.clone();
        user.full_name = data.full_name.clone();
        Ok(self.token(user))
    }

    async fn login(&self, credentials: &LoginCredentials) -> ApiResult<AuthToken> {
        self.check_network()?;
        if credentials.password != "secret" {
            return self.unauthorized();
        }
        Ok(self.token(sample_user()))
    }

    async fn login_google(&self, _credential: &str) -> ApiResult<AuthToken> {
        self.check_network()?;
        let mut user = sample_user();
        user.oauth_provider = Some("google".to_string());
        Ok(self.token(user))
    }

    async fn me(&self) -> ApiResult<User> {
        self.check_network()?;
        match self.credentials.bearer() {
            Some(token) if token == Self::VALID_TOKEN => Ok(sample_user()),
            _ => self.unauthorized(),
        }
    }

    async fn logout(&self) -> ApiResult<()> {
        self.check_network()
    }
}

// ============================================
// MockServer
// ============================================

struct MockState {
    backend: FakeBackend,
    ws_connections: AtomicUsize,
    push: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
    received: Mutex<Vec<String>>,
}

/// axum server speaking the REST subset and the `/ws` push protocol
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockServer {
    pub const VALID_TOKEN: &'static str = FakeBackend::VALID_TOKEN;

    pub async fn start() -> Self {
        let (push, _) = broadcast::channel(64);
        let (kick, _) = broadcast::channel(4);
        let state = Arc::new(MockState {
            backend: FakeBackend::new(),
            ws_connections: AtomicUsize::new(0),
            push,
            kick,
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/polls", get(list_polls).post(create_poll))
            .route("/api/polls/:id", get(get_poll))
            .route("/api/polls/:id/vote", get(vote_status).post(submit_vote))
            .route("/api/auth/me", get(me))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn api_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: format!("http://{}", self.addr),
            request_timeout_secs: 5,
        }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn push(&self, event: InboundEvent) {
        self.push_raw(&event.encode());
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.state.push.send(text.to_string());
    }

    /// Close every open WebSocket from the server side
    pub fn drop_connections(&self) {
        let _ = self.state.kick.send(());
    }

    /// Total WebSocket connections accepted so far
    pub fn ws_connections(&self) -> usize {
        self.state.ws_connections.load(Ordering::SeqCst)
    }

    /// Text frames received from clients
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<MockState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<MockState>) {
    let n = state.ws_connections.fetch_add(1, Ordering::SeqCst) + 1;
    let mut pushes = state.push.subscribe();
    let mut kicks = state.kick.subscribe();

    let welcome = InboundEvent::Connected(ConnectedPayload {
        client_id: Some(format!("client-{}", n)),
        message: Some("Connected to QuickPoll WebSocket".to_string()),
    });
    if socket.send(WsMessage::Text(welcome.encode())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            Ok(text) = pushes.recv() => {
                if socket.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = kicks.recv() => {
                let _ = socket.send(WsMessage::Close(None)).await;
                break;
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Text(text))) => state.received.lock().unwrap().push(text),
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

fn reply<T: Serialize>(result: ApiResult<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(ApiError::Unauthorized) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"detail": "Could not validate credentials"})),
        )
            .into_response(),
        Err(ApiError::Rejected { status, detail }) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(serde_json::json!({ "detail": detail })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"detail": e.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct PageParams {
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Deserialize)]
struct VoteBody {
    option_id: OptionId,
}

async fn list_polls(State(state): State<Arc<MockState>>, Query(params): Query<PageParams>) -> Response {
    reply(
        state
            .backend
            .list_polls(params.page.unwrap_or(1), params.page_size.unwrap_or(10))
            .await,
    )
}

async fn create_poll(State(state): State<Arc<MockState>>, Json(body): Json<PollCreate>) -> Response {
    let result = state.backend.create_poll(&body).await;
    if let Ok(detail) = &result {
        let _ = state.push.send(
            InboundEvent::PollCreated(PollCreatedPayload {
                id: Some(detail.id()),
                title: Some(detail.poll.title.clone()),
            })
            .encode(),
        );
    }
    reply(result)
}

async fn get_poll(State(state): State<Arc<MockState>>, Path(id): Path<PollId>) -> Response {
    reply(state.backend.get_poll(id).await)
}

async fn submit_vote(
    State(state): State<Arc<MockState>>,
    Path(id): Path<PollId>,
    Json(body): Json<VoteBody>,
) -> Response {
    let result = state.backend.submit_vote(id, body.option_id).await;
    if result.is_ok() {
        let _ = state.push.send(
            InboundEvent::VoteUpdate(VoteUpdatePayload {
                poll_id: Some(id),
                option_id: Some(body.option_id),
                ..Default::default()
            })
            .encode(),
        );
    }
    reply(result)
}

async fn vote_status(State(state): State<Arc<MockState>>, Path(id): Path<PollId>) -> Response {
    reply(state.backend.vote_status(id).await)
}

async fn me(headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", MockServer::VALID_TOKEN))
        .unwrap_or(false);

    if authorized {
        reply(Ok(sample_user()))
    } else {
        reply::<User>(Err(ApiError::Unauthorized))
    }
}
