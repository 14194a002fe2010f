//! relay-gateway — HTTP invocation endpoint for the request router
//!
//! Accepts invocation events over HTTP so the router can run outside a
//! managed serverless platform.

pub mod auth;
pub mod server;

pub use server::{GatewayServer, GatewayState};
