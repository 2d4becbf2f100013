//! Transport layer for the digital twin
//!
//! Exposes the engine over REST and WebSocket, plus health and metrics.

pub mod api;
pub mod config;
