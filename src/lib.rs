//! Ride Relay - real-time presence and subscription broadcast engine
//!
//! This library provides the live layer of a rider-safety coordination
//! platform: chat typing indicators, rider-location tracking subscriptions,
//! and emergency escalation broadcast over WebSocket.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod storage;

// Re-export main components
pub use config::*;
pub use constants::*;
