//! keeper: multi-user item store with a syncing client.
//!
//! The server authenticates users with short-lived signed tokens, serves
//! reads straight from storage and funnels every write through one bounded
//! queue drained by a single worker. The client keeps a local replica and
//! reconciles it against the server on demand.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod telemetry;
// Server side: durable store, write queue, core service and HTTP surface
pub mod queue;
pub mod rest;
pub mod service;
pub mod storage;
// Client side: local replica, reconciliation and the HTTP client
pub mod cache;
pub mod client;
pub mod sync;

pub use error::{KeeperError, Result};
