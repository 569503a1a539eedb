//! Gateway: the HTTP endpoint Messenger delivers webhooks to.
//!
//! `POST /webhook` answers as soon as a delivery is queued; a background task runs
//! queued deliveries through the connector.

mod server;

pub use server::{build_router, run_gateway, serve, spawn_processor, GatewayState};
