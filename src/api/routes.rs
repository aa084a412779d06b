//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))

        // Accounts and ledger
        .route("/api/users", post(create_user_handler))
        .route("/api/users/:id", get(user_handler))
        .route("/api/users/:id/history", get(history_handler))
        .route("/api/users/:id/credit", post(credit_handler))

        // Wagers
        .route("/api/roulette/spin", post(spin_handler))
        .route("/api/blackjack/start", post(blackjack_start_handler))
        .route("/api/blackjack/hit", post(blackjack_hit_handler))
        .route("/api/blackjack/stand", post(blackjack_stand_handler))
        .route("/api/blackjack/double", post(blackjack_double_handler))
        .route("/api/blackjack/split", post(blackjack_split_handler))
        .route("/api/mines/start", post(mines_start_handler))
        .route("/api/mines/reveal", post(mines_reveal_handler))
        .route("/api/mines/cashout", post(mines_cashout_handler))
        .route("/api/games/:id", get(game_handler))

        // Operator surface
        .route("/api/settings/:kind", get(settings_handler).put(update_settings_handler))
        .route("/api/cleanup/run", post(cleanup_handler))

        .with_state(state)
}
