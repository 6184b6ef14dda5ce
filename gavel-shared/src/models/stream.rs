//! Decoding of live-stream frame payloads into domain events.

use serde::Deserialize;
use serde_json::Value;

use super::{
    bid::{AuctionClosed, LeaderboardUpdate},
    chat::ChatMessage,
    envelope::ApiResponse,
    notification::UserNotification,
};

/// Event name of the handshake frame sent when a stream opens.
pub const CONNECTED_EVENT: &str = "connected";

/// Payload the server sends purely to hold an idle connection open.
pub const KEEP_ALIVE_SENTINEL: &str = "keep-alive";

/// Event name of the chat push.
pub const CHAT_MESSAGE_EVENT: &str = "chat_message";

/// Event name of the leaderboard push.
pub const LEADERBOARD_UPDATE_EVENT: &str = "leaderboard_update";

/// Event name of the auction-closed broadcast.
pub const AUCTION_CLOSED_EVENT: &str = "auction_closed";

/// A domain type that can be built from one decoded stream frame.
///
/// `event` is the frame's `event:` field, if any; `payload` is its data
/// field, already parsed as JSON.
pub trait FromStreamFrame: Sized {
    /// # Errors
    /// Returns an error when the payload does not describe this type.
    fn from_frame(event: Option<&str>, payload: Value) -> Result<Self, serde_json::Error>;
}

impl FromStreamFrame for Value {
    fn from_frame(_event: Option<&str>, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(payload)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeEnveloped<T> {
    Enveloped(ApiResponse<T>),
    Bare(T),
}

impl FromStreamFrame for ChatMessage {
    fn from_frame(_event: Option<&str>, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match serde_json::from_value::<MaybeEnveloped<Self>>(payload)? {
            MaybeEnveloped::Enveloped(envelope) => envelope.data,
            MaybeEnveloped::Bare(message) => message,
        })
    }
}

/// Everything pushed on a product's stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProductEvent {
    Leaderboard(LeaderboardUpdate),
    Closed(AuctionClosed),
}

impl FromStreamFrame for ProductEvent {
    fn from_frame(event: Option<&str>, payload: Value) -> Result<Self, serde_json::Error> {
        match event {
            Some(LEADERBOARD_UPDATE_EVENT) => serde_json::from_value(payload).map(Self::Leaderboard),
            Some(AUCTION_CLOSED_EVENT) => serde_json::from_value(payload).map(Self::Closed),
            // Unnamed frames are told apart by shape.
            _ => serde_json::from_value(payload),
        }
    }
}

impl FromStreamFrame for UserNotification {
    fn from_frame(event: Option<&str>, payload: Value) -> Result<Self, serde_json::Error> {
        Self::from_event(event.unwrap_or("message"), payload)
    }
}
