//! API server implementation
//!
//! REST endpoints for running block checks and rank checks on demand and
//! for driving the sweep scheduler.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{build_router, ApiServer, AppState};
