//! Typed auction endpoints on top of the request pipeline.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use shared::{
    config::{Config, join},
    models::{
        ApiResponse, AuthResponse, BidRecord, ChatMessage, ExchangeTokenRequest, LeaderboardEntry,
        LoginRequest, Page, PlaceBidRequest, RefreshTokenRequest, SendChatRequest,
    },
};
use tracing::{info, instrument, warn};
use url::Url;

use crate::{
    error::PipelineError,
    pipeline::RequestPipeline,
    reconcile::PageSource,
    session::Session,
    transport::PreparedRequest,
};

/// Endpoint client for one backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuctionApi {
    pipeline: RequestPipeline,
    stream_base_url: Url,
}

impl AuctionApi {
    #[must_use]
    pub const fn new(pipeline: RequestPipeline, stream_base_url: Url) -> Self {
        Self {
            pipeline,
            stream_base_url,
        }
    }

    #[must_use]
    pub fn from_config(pipeline: RequestPipeline, config: &Config) -> Self {
        Self::new(pipeline, config.stream_base_url.clone())
    }

    #[must_use]
    pub const fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        self.pipeline.session()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PipelineError> {
        let request = PreparedRequest::get(self.pipeline.url(path));
        let envelope: ApiResponse<T> = self.pipeline.send_json(request).await?;
        Ok(envelope.data)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, PipelineError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = PreparedRequest::post(self.pipeline.url(path)).json(body)?;
        let envelope: ApiResponse<T> = self.pipeline.send_json(request).await?;
        Ok(envelope.data)
    }

    /// Signs in with email and password and stores the issued credential.
    ///
    /// # Errors
    /// Returns [`PipelineError::Status`] for rejected credentials.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, PipelineError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            recaptcha_token: None,
        };
        let response: AuthResponse = self.post("/auth/login", &body).await?;
        self.session().apply_auth_response(&response);
        info!(user_id = ?self.session().user_id(), "signed in");
        Ok(response)
    }

    /// Trades an OAuth authorization code for a credential.
    ///
    /// # Errors
    /// Returns [`PipelineError::Status`] when the code is rejected.
    pub async fn exchange(&self, code: &str) -> Result<AuthResponse, PipelineError> {
        let body = ExchangeTokenRequest {
            code: code.to_string(),
        };
        let response: AuthResponse = self.post("/auth/exchange", &body).await?;
        self.session().apply_auth_response(&response);
        Ok(response)
    }

    /// Revokes the refresh token server side, then clears the credential
    /// whatever the server answered.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.session().refresh_token() {
            let result = PreparedRequest::post(self.pipeline.url("/auth/logout"))
                .json(&RefreshTokenRequest { refresh_token });
            let outcome = match result {
                Ok(request) => self.pipeline.send(request).await.map(|_| ()),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = outcome {
                warn!(error = %err, "logout request failed; clearing local session anyway");
            }
        }
        self.session().clear();
        info!("signed out");
    }

    /// One page of a transaction's chat, newest first.
    ///
    /// # Errors
    /// Pipeline and decoding failures.
    pub async fn chat_page(
        &self,
        transaction_id: i64,
        page: u32,
        size: u32,
    ) -> Result<Page<ChatMessage>, PipelineError> {
        self.get(&format!(
            "/chat/messages/{transaction_id}/paged?page={page}&size={size}"
        ))
        .await
    }

    /// # Errors
    /// Pipeline and decoding failures.
    pub async fn send_chat(&self, request: &SendChatRequest) -> Result<ChatMessage, PipelineError> {
        self.post("/chat/send", request).await
    }

    /// # Errors
    /// Pipeline and decoding failures.
    pub async fn unread_count(&self, transaction_id: i64) -> Result<u64, PipelineError> {
        self.get(&format!("/chat/unread-count/{transaction_id}")).await
    }

    /// Marks every message of the transaction's chat as read.
    ///
    /// # Errors
    /// Pipeline failures and non-2xx answers.
    pub async fn mark_read(&self, transaction_id: i64) -> Result<(), PipelineError> {
        let request =
            PreparedRequest::post(self.pipeline.url(&format!("/chat/mark-read/{transaction_id}")));
        let response = self.pipeline.send(request).await?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(PipelineError::from_status(response.status, &response.body))
        }
    }

    /// The product's newest bids (at most 100), newest first. Rows of bidders
    /// blocked from the product are flagged.
    ///
    /// # Errors
    /// Pipeline and decoding failures.
    pub async fn bid_history(&self, product_id: i64) -> Result<Vec<LeaderboardEntry>, PipelineError> {
        self.get(&format!("/bidder/products/{product_id}/bids")).await
    }

    /// One page of the product's bids, highest amount first.
    ///
    /// # Errors
    /// Pipeline and decoding failures.
    pub async fn bid_ranking(
        &self,
        product_id: i64,
        page: u32,
        size: u32,
    ) -> Result<Page<LeaderboardEntry>, PipelineError> {
        self.get(&format!(
            "/public/products/{product_id}/bid-ranking?page={page}&size={size}"
        ))
        .await
    }

    /// # Errors
    /// Returns [`PipelineError::Status`] when the bid is refused.
    pub async fn place_bid(&self, product_id: i64, amount: f64) -> Result<BidRecord, PipelineError> {
        self.post("/bidder/bids", &PlaceBidRequest { product_id, amount })
            .await
    }

    #[must_use]
    pub fn chat_stream_url(&self, transaction_id: i64) -> Url {
        join(&self.stream_base_url, &format!("/chat/stream/{transaction_id}"))
    }

    #[must_use]
    pub fn product_stream_url(&self, product_id: i64) -> Url {
        join(
            &self.stream_base_url,
            &format!("/notifications/stream/product/{product_id}"),
        )
    }

    #[must_use]
    pub fn user_stream_url(&self) -> Url {
        join(&self.stream_base_url, "/notifications/stream/user")
    }

    /// History source for one transaction's chat.
    #[must_use]
    pub fn chat_history(&self, transaction_id: i64) -> ChatHistory {
        ChatHistory {
            api: self.clone(),
            transaction_id,
        }
    }

    /// Ranked history source for one product's bids.
    #[must_use]
    pub fn bid_source(&self, product_id: i64) -> BidRanking {
        BidRanking {
            api: self.clone(),
            product_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatHistory {
    api: AuctionApi,
    transaction_id: i64,
}

#[async_trait]
impl PageSource<ChatMessage> for ChatHistory {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<ChatMessage>, PipelineError> {
        self.api.chat_page(self.transaction_id, page, size).await
    }
}

/// Pages through a product's bids from the highest amount down.
#[derive(Debug, Clone)]
pub struct BidRanking {
    api: AuctionApi,
    product_id: i64,
}

#[async_trait]
impl PageSource<LeaderboardEntry> for BidRanking {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<LeaderboardEntry>, PipelineError> {
        self.api.bid_ranking(self.product_id, page, size).await
    }
}
