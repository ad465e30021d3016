//! QuickPoll REST API Client
//!
//! HTTP client for the QuickPoll REST API. Controllers talk to the server
//! through the [`PollBackend`] trait so they can be driven by fakes in tests.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::dto::{
    AuthToken, GoogleAuthRequest, LikeResponse, LikeStatus, LoginCredentials, PollCreate,
    PollDetail, PollId, PollList, OptionId, RegisterData, User, VoteCreate, VoteResponse,
    VoteStatus,
};
use super::error::{ApiError, ApiResult};
use crate::session::CredentialSlot;

/// Operations the client needs from the QuickPoll server
#[async_trait]
pub trait PollBackend: Send + Sync {
    async fn list_polls(&self, page: u32, page_size: u32) -> ApiResult<PollList>;
    async fn get_poll(&self, poll_id: PollId) -> ApiResult<PollDetail>;
    async fn create_poll(&self, poll: &PollCreate) -> ApiResult<PollDetail>;

    async fn submit_vote(&self, poll_id: PollId, option_id: OptionId) -> ApiResult<VoteResponse>;
    async fn vote_status(&self, poll_id: PollId) -> ApiResult<VoteStatus>;

    async fn like(&self, poll_id: PollId) -> ApiResult<LikeResponse>;
    async fn unlike(&self, poll_id: PollId) -> ApiResult<()>;
    async fn like_status(&self, poll_id: PollId) -> ApiResult<LikeStatus>;

    async fn register(&self, data: &RegisterData) -> ApiResult<AuthToken>;
    async fn login(&self, credentials: &LoginCredentials) -> ApiResult<AuthToken>;
    async fn login_google(&self, credential: &str) -> ApiResult<AuthToken>;
    async fn me(&self) -> ApiResult<User>;
    async fn logout(&self) -> ApiResult<()>;
}

/// Configuration for the REST client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the API server (e.g., "http://localhost:8000")
    pub base_url: String,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// reqwest implementation of [`PollBackend`]
///
/// Keeps a cookie jar so the anonymous viewer session survives between
/// calls, and attaches the bearer credential from the shared slot.
pub struct ApiClient {
    client: Client,
    config: ApiClientConfig,
    credentials: CredentialSlot,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig, credentials: CredentialSlot) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            config: ApiClientConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            credentials,
        })
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Send a request and check its status, reporting 401s to the slot
    async fn execute(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let bearer = self.credentials.bearer();
        let builder = match &bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_status(status, &body);
        if err.is_unauthorized() {
            self.credentials.reject(bearer);
        }
        tracing::debug!(status = status.as_u16(), error = %err, "API request failed");
        Err(err)
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = self.execute(builder).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PollBackend for ApiClient {
    async fn list_polls(&self, page: u32, page_size: u32) -> ApiResult<PollList> {
        let builder = self
            .request(Method::GET, "/api/polls")
            .query(&[("page", page), ("page_size", page_size)]);
        self.fetch(builder).await
    }

    async fn get_poll(&self, poll_id: PollId) -> ApiResult<PollDetail> {
        self.fetch(self.request(Method::GET, &format!("/api/polls/{}", poll_id)))
            .await
    }

    async fn create_poll(&self, poll: &PollCreate) -> ApiResult<PollDetail> {
        self.fetch(self.request(Method::POST, "/api/polls").json(poll))
            .await
    }

    async fn submit_vote(&self, poll_id: PollId, option_id: OptionId) -> ApiResult<VoteResponse> {
        let builder = self
            .request(Method::POST, &format!("/api/polls/{}/vote", poll_id))
            .json(&VoteCreate { option_id });
        self.fetch(builder).await
    }

    async fn vote_status(&self, poll_id: PollId) -> ApiResult<VoteStatus> {
        self.fetch(self.request(Method::GET, &format!("/api/polls/{}/vote", poll_id)))
            .await
    }

    async fn like(&self, poll_id: PollId) -> ApiResult<LikeResponse> {
        self.fetch(self.request(Method::POST, &format!("/api/polls/{}/like", poll_id)))
            .await
    }

    async fn unlike(&self, poll_id: PollId) -> ApiResult<()> {
        self.execute(self.request(Method::DELETE, &format!("/api/polls/{}/like", poll_id)))
            .await
            .map(|_| ())
    }

    async fn like_status(&self, poll_id: PollId) -> ApiResult<LikeStatus> {
        self.fetch(self.request(Method::GET, &format!("/api/polls/{}/like", poll_id)))
            .await
    }

    async fn register(&self, data: &RegisterData) -> ApiResult<AuthToken> {
        self.fetch(self.request(Method::POST, "/api/auth/register").json(data))
            .await
    }

    async fn login(&self, credentials: &LoginCredentials) -> ApiResult<AuthToken> {
        self.fetch(self.request(Method::POST, "/api/auth/login").json(credentials))
            .await
    }

    async fn login_google(&self, credential: &str) -> ApiResult<AuthToken> {
        let body = GoogleAuthRequest {
            credential: credential.to_string(),
        };
        self.fetch(self.request(Method::POST, "/api/auth/google").json(&body))
            .await
    }

    async fn me(&self) -> ApiResult<User> {
        self.fetch(self.request(Method::GET, "/api/auth/me")).await
    }

    async fn logout(&self) -> ApiResult<()> {
        self.execute(self.request(Method::POST, "/api/auth/logout"))
            .await
            .map(|_| ())
    }
}
