//! # callswarm-server
//!
//! HTTP and WebSocket surface over `callswarm-runtime`.
//!
//! ## Crate Position
//!
//! Owns everything at the network boundary:
//!
//! - **Routes** — run start/results REST endpoints, the `/call-status`
//!   ingestion endpoint, health, `/metrics`
//! - **Broadcast** — WebSocket fan-out of the orchestrator's event
//!   stream, with slow-client drop semantics
//! - **Webhook** — shared-secret authenticity check for inbound results
//! - **Metrics** — Prometheus recorder install and render

#![deny(unsafe_code)]

pub mod broadcast;
pub mod metrics;
pub mod routes;
pub mod webhook;

pub use broadcast::{BroadcastManager, ClientConnection};
pub use routes::{router, AppState, WS_PATH};
