pub mod auth;
pub mod bid;
pub mod chat;
pub mod envelope;
pub mod notification;
pub mod stream;
pub mod timestamp;

pub use auth::{
    AccessTokenClaims, AuthResponse, ExchangeTokenRequest, LoginRequest, RefreshTokenRequest,
    UserProfile,
};
pub use bid::{
    AuctionClosed, BidRecord, LatestBid, LeaderboardEntry, LeaderboardUpdate, PlaceBidRequest,
};
pub use chat::{ChatMessage, ChatMessageType, SendChatRequest};
pub use envelope::{ApiResponse, ErrorResponse, Page};
pub use notification::{ReceivedNotification, UserNotification};
pub use stream::{FromStreamFrame, ProductEvent};
pub use timestamp::Timestamp;
