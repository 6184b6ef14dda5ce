use serde::{Deserialize, Serialize};

use super::timestamp::Timestamp;

/// Personal notification pushed on the per-user stream. The variant is
/// selected by the frame's event name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum UserNotification {
    Outbid(OutbidNotice),
    NewBid(NewBidNotice),
    AuctionEnded(AuctionEndedNotice),
    NewQuestion(NewQuestionNotice),
    QuestionAnswered(QuestionAnsweredNotice),
    NewChatMessage(NewChatMessageNotice),
    ShippingAddressUpdated(TransactionNotice),
    OrderShipped(OrderShippedNotice),
    DeliveryConfirmed(TransactionNotice),
    TransactionCancelled(TransactionCancelledNotice),
    SystemMessage(SystemMessageNotice),
}

impl UserNotification {
    /// Event names carried on the user stream.
    pub const KINDS: [&'static str; 11] = [
        "outbid",
        "new_bid",
        "auction_ended",
        "new_question",
        "question_answered",
        "new_chat_message",
        "shipping_address_updated",
        "order_shipped",
        "delivery_confirmed",
        "transaction_cancelled",
        "system_message",
    ];

    /// Decodes a payload given the event name it arrived under. Event names
    /// are matched case-insensitively (`SYSTEM_MESSAGE` is `system_message`).
    ///
    /// # Errors
    /// Fails for unknown event names or payloads that do not match the kind.
    pub fn from_event(kind: &str, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "kind": kind.to_ascii_lowercase(),
            "payload": payload,
        }))
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Outbid(_) => "outbid",
            Self::NewBid(_) => "new_bid",
            Self::AuctionEnded(_) => "auction_ended",
            Self::NewQuestion(_) => "new_question",
            Self::QuestionAnswered(_) => "question_answered",
            Self::NewChatMessage(_) => "new_chat_message",
            Self::ShippingAddressUpdated(_) => "shipping_address_updated",
            Self::OrderShipped(_) => "order_shipped",
            Self::DeliveryConfirmed(_) => "delivery_confirmed",
            Self::TransactionCancelled(_) => "transaction_cancelled",
            Self::SystemMessage(_) => "system_message",
        }
    }

    #[must_use]
    pub fn product_id(&self) -> Option<i64> {
        match self {
            Self::Outbid(notice) => Some(notice.product_id),
            Self::NewBid(notice) => Some(notice.product_id),
            Self::AuctionEnded(notice) => Some(notice.product_id),
            Self::NewQuestion(notice) => Some(notice.product_id),
            Self::QuestionAnswered(notice) => Some(notice.product_id),
            Self::NewChatMessage(notice) => Some(notice.product_id),
            Self::ShippingAddressUpdated(_)
            | Self::OrderShipped(_)
            | Self::DeliveryConfirmed(_)
            | Self::TransactionCancelled(_)
            | Self::SystemMessage(_) => None,
        }
    }

    #[must_use]
    pub fn transaction_id(&self) -> Option<i64> {
        match self {
            Self::NewChatMessage(notice) => Some(notice.transaction_id),
            Self::ShippingAddressUpdated(notice) | Self::DeliveryConfirmed(notice) => {
                Some(notice.transaction_id)
            }
            Self::OrderShipped(notice) => Some(notice.transaction_id),
            Self::TransactionCancelled(notice) => Some(notice.transaction_id),
            Self::SystemMessage(notice) => notice.transaction_id,
            Self::Outbid(_)
            | Self::NewBid(_)
            | Self::AuctionEnded(_)
            | Self::NewQuestion(_)
            | Self::QuestionAnswered(_) => None,
        }
    }

    /// Server time of the event. Transaction updates and some system
    /// messages are sent without one.
    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Outbid(notice) => Some(notice.timestamp),
            Self::NewBid(notice) => Some(notice.timestamp),
            Self::AuctionEnded(notice) => Some(notice.timestamp),
            Self::NewQuestion(notice) => Some(notice.timestamp),
            Self::QuestionAnswered(notice) => Some(notice.timestamp),
            Self::NewChatMessage(notice) => Some(notice.timestamp),
            Self::SystemMessage(notice) => notice.timestamp,
            Self::ShippingAddressUpdated(_)
            | Self::OrderShipped(_)
            | Self::DeliveryConfirmed(_)
            | Self::TransactionCancelled(_) => None,
        }
    }

    /// One-line description for terminals and logs.
    #[must_use]
    pub fn headline(&self) -> String {
        match self {
            Self::Outbid(notice) => format!(
                "outbid on {} (new amount {})",
                notice.product_name, notice.new_amount
            ),
            Self::NewBid(notice) => format!(
                "new bid of {} by {} on {}",
                notice.amount, notice.bidder_name, notice.product_name
            ),
            Self::AuctionEnded(notice) if notice.is_winner => format!(
                "you won {} for {}",
                notice.product_name, notice.final_amount
            ),
            Self::AuctionEnded(notice) => format!(
                "auction for {} ended at {}",
                notice.product_name, notice.final_amount
            ),
            Self::NewQuestion(notice) => format!(
                "{} asked about {}: {}",
                notice.asker_name, notice.product_name, notice.question
            ),
            Self::QuestionAnswered(notice) => {
                format!("answer on {}: {}", notice.product_name, notice.answer)
            }
            Self::NewChatMessage(notice) => format!(
                "{} on {}: {}",
                notice.sender_name, notice.product_name, notice.message
            ),
            Self::ShippingAddressUpdated(notice) => {
                format!("buyer sent a shipping address for {}", notice.product_name)
            }
            Self::OrderShipped(notice) => format!(
                "{} shipped (tracking {})",
                notice.product_name, notice.tracking_number
            ),
            Self::DeliveryConfirmed(notice) => {
                format!("delivery of {} confirmed", notice.product_name)
            }
            Self::TransactionCancelled(notice) => format!(
                "order for {} cancelled: {}",
                notice.product_name, notice.reason
            ),
            Self::SystemMessage(notice) => notice.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutbidNotice {
    pub product_id: i64,
    pub product_name: String,
    pub new_amount: f64,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewBidNotice {
    pub product_id: i64,
    pub product_name: String,
    pub amount: f64,
    pub bidder_name: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionEndedNotice {
    pub product_id: i64,
    pub product_name: String,
    pub is_winner: bool,
    pub final_amount: f64,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestionNotice {
    pub product_id: i64,
    pub product_name: String,
    pub question: String,
    pub asker_name: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnsweredNotice {
    pub product_id: i64,
    pub product_name: String,
    pub answer: String,
    pub timestamp: Timestamp,
}

/// A chat message for a transaction whose chat is not open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewChatMessageNotice {
    pub transaction_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub sender_name: String,
    pub message: String,
    pub message_id: i64,
    pub timestamp: Timestamp,
}

/// Post-auction step on a transaction (shipping address given, delivery
/// confirmed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionNotice {
    pub transaction_id: i64,
    pub product_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderShippedNotice {
    pub transaction_id: i64,
    pub product_name: String,
    pub tracking_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCancelledNotice {
    pub transaction_id: i64,
    pub product_name: String,
    pub reason: String,
}

/// Free-text notice. Arrives as an object (broadcasts carry a timestamp,
/// transaction notes a transaction id) or as a bare string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "SystemMessageWire")]
pub struct SystemMessageNotice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SystemMessageWire {
    Text(String),
    #[serde(rename_all = "camelCase")]
    Notice {
        #[serde(default)]
        transaction_id: Option<i64>,
        message: String,
        #[serde(default)]
        timestamp: Option<Timestamp>,
    },
}

impl From<SystemMessageWire> for SystemMessageNotice {
    fn from(wire: SystemMessageWire) -> Self {
        match wire {
            SystemMessageWire::Text(message) => Self {
                transaction_id: None,
                message,
                timestamp: None,
            },
            SystemMessageWire::Notice {
                transaction_id,
                message,
                timestamp,
            } => Self {
                transaction_id,
                message,
                timestamp,
            },
        }
    }
}

/// A notification as the client received it.
///
/// `sequence` counts arrivals on one stream and `received_at` never goes
/// backwards, so the pair places every notification in the feed even when
/// the server sent no time.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedNotification {
    pub sequence: u64,
    pub received_at: Timestamp,
    pub notification: UserNotification,
}

impl ReceivedNotification {
    #[must_use]
    pub const fn new(sequence: u64, received_at: Timestamp, notification: UserNotification) -> Self {
        Self {
            sequence,
            received_at,
            notification,
        }
    }

    /// Server time when the payload has one, otherwise the arrival time.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.notification.timestamp().unwrap_or(self.received_at)
    }

    #[must_use]
    pub fn headline(&self) -> String {
        self.notification.headline()
    }
}
