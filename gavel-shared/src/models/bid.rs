use serde::{Deserialize, Serialize};

use super::timestamp::Timestamp;

/// One row of a product's bid history, bid ranking, or live leaderboard.
///
/// The backend masks bidders and leaves `userId` out of these rows; only
/// `blocked` on bid-history rows says the bidder was barred from the product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub masked_user_name: String,
    pub amount: f64,
    #[serde(default)]
    pub blocked: bool,
    pub created_at: Timestamp,
}

/// The bid that triggered a leaderboard push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatestBid {
    pub amount: f64,
    pub product_id: i64,
    pub bidder_name: String,
    pub timestamp: Timestamp,
}

/// `leaderboard_update` push: the newest bid plus the current top entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardUpdate {
    pub latest_bid: LatestBid,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// `auction_closed` push broadcast to everyone watching a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionClosed {
    pub product_id: i64,
    #[serde(default)]
    pub product_name: Option<String>,
    pub winner_name: String,
    pub final_amount: f64,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Payload for `/bidder/bids`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub product_id: i64,
    pub amount: f64,
}

/// Bid record returned when a bid is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidRecord {
    pub id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub product_name: Option<String>,
    pub user_id: i64,
    #[serde(default)]
    pub masked_user_name: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub is_auto_bid: bool,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_update_from_push() {
        let json = r#"{
            "latestBid": {
                "amount": 120.5,
                "productId": 9,
                "bidderName": "****ann",
                "timestamp": "2025-01-02T10:00:00"
            },
            "leaderboard": [
                {"maskedUserName": "****ann", "amount": 120.5, "createdAt": "2025-01-02T10:00:00"},
                {"maskedUserName": "****bob", "amount": 100, "createdAt": "2025-01-02T09:00:00"}
            ]
        }"#;
        let update: LeaderboardUpdate = serde_json::from_str(json).unwrap();

        assert_eq!(update.latest_bid.product_id, 9);
        assert_eq!(update.leaderboard.len(), 2);
        assert_eq!(update.leaderboard[0].user_id, None);
        assert!(!update.leaderboard[1].blocked);
    }

    #[test]
    fn history_row_keeps_blocked_flag() {
        let entry: LeaderboardEntry = serde_json::from_str(
            r#"{"maskedUserName": "****bob", "amount": 90, "createdAt": "2025-01-02T09:00:00.123456", "blocked": true}"#,
        )
        .unwrap();

        assert!(entry.blocked);
        assert_eq!(entry.user_id, None);
        assert!(!serde_json::to_string(&entry).unwrap().contains("userId"));
    }
}
