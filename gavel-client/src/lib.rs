#![cfg_attr(not(test), forbid(unsafe_code))]

//! Real-time sync layer for Gavel auction clients.
//!
//! A [`session::Session`] holds the credential. Every REST call goes through
//! the [`pipeline::RequestPipeline`], which refreshes that credential at most
//! once at a time. [`stream::EventStreamClient`] reads server-sent events, and
//! [`live`] merges them with paginated history through [`reconcile`].

pub mod api;
pub mod error;
pub mod live;
pub mod pipeline;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod stream;
pub mod subscription;
pub mod tracer;
pub mod transport;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod test_support;
