//! Event-stream client: long-lived, cancellable `text/event-stream`
//! connections that surface typed payloads to one handler at a time.

mod client;
mod frame;

pub use client::{EventStreamClient, ResponseMeta, StreamHandler, StreamOutcome, pump};
pub use frame::{Frame, FrameDecoder};
