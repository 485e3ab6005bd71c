//! Live level-3 order book reconstruction.
//!
//! Keeps a full-depth order book in step with a sequenced websocket diff
//! feed: a REST snapshot seeds the book, diff events are applied in
//! sequence order, and any gap triggers a fresh snapshot. The websocket
//! session handles the handshake, heartbeats, acknowledged subscriptions
//! and bounded message queues.

pub mod book;
pub mod config;
pub mod error;
pub mod models;
pub mod rest;
pub mod sync;
pub mod websocket;

pub use error::{LobsyncError, Result};
