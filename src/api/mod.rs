//! Points API Service
//!
//! HTTP surface for balances, wagers, game settings and the cleanup trigger.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use server::{build_app, shutdown_signal, ApiServer};
