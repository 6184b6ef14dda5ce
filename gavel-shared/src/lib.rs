#![cfg_attr(not(test), forbid(unsafe_code))]

//! Wire models and configuration shared by the Gavel client library and CLI.

pub mod config;
pub mod models;
