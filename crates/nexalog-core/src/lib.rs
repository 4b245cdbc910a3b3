//! Core domain + application logic for the Nexalog bot control panel.
//!
//! This crate is intentionally transport-agnostic. The bot's HTTP API lives
//! behind the `remote::RemoteSyncClient` port, implemented in adapter crates.

pub mod classify;
pub mod config;
pub mod domain;
pub mod errors;
pub mod live;
pub mod logging;
pub mod notify;
pub mod optimistic;
pub mod panel;
pub mod poll;
pub mod remote;
pub mod store;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
