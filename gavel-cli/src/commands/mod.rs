pub mod bids;
pub mod chat;
pub mod completion;
pub mod config;
pub mod context;
pub mod notifications;
pub mod session;
