use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::timestamp::Timestamp;

/// Success envelope wrapping every REST payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: T,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

const fn default_success() -> bool {
    true
}

/// One page of a server-side paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
    pub last: bool,
}

impl<T> Page<T> {
    /// Wraps an unpaginated listing as the one and only page.
    #[must_use]
    pub fn single(content: Vec<T>) -> Self {
        let len = content.len();
        Self {
            content,
            page: 0,
            size: u32::try_from(len).unwrap_or(u32::MAX),
            total_elements: len as u64,
            total_pages: 1,
            last: true,
        }
    }
}

/// Error body returned by the backend for non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub validation_errors: Option<HashMap<String, String>>,
}

impl ErrorResponse {
    /// Best human-readable summary of the error.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}
