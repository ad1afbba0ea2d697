//! # chatmux-store
//!
//! In-memory conversation cache for the chatmux engine.
//!
//! The [`HistoryStore`] owns one [`Conversation`] per conversation key. Each
//! conversation is fed from two sides: live messages routed from the
//! websocket, and a one-time history fetch issued the first time the user
//! opens it. The store reconciles both into a single ordered sequence.
//! Nothing is persisted across restarts.

pub mod history;
pub mod merge;
pub mod models;

mod error;

pub use error::FetchError;
pub use history::HistoryStore;
pub use models::*;
