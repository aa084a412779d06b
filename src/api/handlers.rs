//! Request Handlers
//!
//! Thin adapters from JSON requests onto `GameService`, the points store and
//! the stale game scanner.

use super::{
    errors::ApiError,
    middleware::{check_operator_key, RequestId},
    models::*,
};
use crate::cleanup::{CleanupReport, StaleGameScanner};
use crate::errors::RewardsError;
use crate::games::blackjack::BlackjackAction;
use crate::games::{GameId, GameKind, GameService, GameSettings};
use crate::ledger::UserId;
use crate::metrics::MetricsRegistry;
use crate::store::{decode_cursor, PointsStore};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state
pub struct AppState {
    pub service: Arc<GameService>,
    pub store: Arc<dyn PointsStore>,
    pub scanner: Arc<StaleGameScanner>,
    pub metrics: Option<Arc<MetricsRegistry>>,
    /// Operator key for cleanup, credits and settings writes. `None` disables the check.
    pub operator_key: Option<String>,
    pub version: String,
}

fn rewards_error(request_id: &RequestId) -> impl FnOnce(RewardsError) -> ApiError + '_ {
    move |e| ApiError::from_rewards(request_id.0.clone(), e)
}

fn parse_kind(request_id: &RequestId, raw: &str) -> Result<GameKind, ApiError> {
    raw.parse::<GameKind>()
        .map_err(|_| ApiError::bad_request(request_id.0.clone(), format!("Unknown game kind: {}", raw)))
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(metrics) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            metrics.to_prometheus_format(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics disabled\n".to_string(),
        ),
    }
}

/// POST /api/users
pub async fn create_user_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let account = state
        .store
        .create_user(request.user_id, request.username)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// GET /api/users/:id
pub async fn user_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserResponse>, ApiError> {
    let account = state
        .store
        .user(user_id)
        .await
        .map_err(rewards_error(&request_id))?
        .ok_or_else(|| ApiError::not_found(request_id.0.clone(), format!("User {} not found", user_id)))?;
    Ok(Json(account.into()))
}

/// GET /api/users/:id/history?cursor={cursor}&limit={n}
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    if query.limit == 0 || query.limit > MAX_HISTORY_LIMIT {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT),
        ));
    }
    if let Some(cursor) = query.cursor.as_deref() {
        decode_cursor(cursor)
            .map_err(|_| ApiError::bad_request(request_id.0.clone(), format!("Invalid cursor: {}", cursor)))?;
    }
    let page = state
        .store
        .history(user_id, query.cursor.as_deref(), query.limit)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok(Json(HistoryResponse {
        user_id,
        entries: page.entries,
        next_cursor: page.next_cursor,
    }))
}

/// POST /api/users/:id/credit
pub async fn credit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<UserId>,
    Json(request): Json<CreditRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    check_operator_key(&headers, state.operator_key.as_deref(), &request_id.0)?;
    if request.amount == 0 {
        return Err(ApiError::bad_request(request_id.0.clone(), "amount must be non-zero".to_string()));
    }
    let points = state
        .service
        .grant_points(user_id, request.amount, request.kind, &request.description)
        .await
        .map_err(rewards_error(&request_id))?;
    info!(user_id, amount = request.amount, kind = %request.kind, "points credited");
    Ok(Json(BalanceResponse { user_id, points }))
}

/// POST /api/roulette/spin
pub async fn spin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpinRequest>,
) -> Result<Json<SpinResponse>, ApiError> {
    let receipt = state
        .service
        .spin_roulette(request.user_id, request.bets)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok(Json(receipt.into()))
}

/// POST /api/blackjack/start
pub async fn blackjack_start_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartBlackjackRequest>,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    let update = state
        .service
        .start_blackjack(request.user_id, request.bet_amount)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok(Json(update.into()))
}

async fn blackjack_move(
    request_id: RequestId,
    state: Arc<AppState>,
    request: GameActionRequest,
    action: BlackjackAction,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    let update = state
        .service
        .blackjack_action(request.user_id, request.game_id, action)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok(Json(update.into()))
}

/// POST /api/blackjack/hit
pub async fn blackjack_hit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<GameActionRequest>,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    blackjack_move(request_id, state, request, BlackjackAction::Hit).await
}

/// POST /api/blackjack/stand
pub async fn blackjack_stand_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<GameActionRequest>,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    blackjack_move(request_id, state, request, BlackjackAction::Stand).await
}

/// POST /api/blackjack/double
pub async fn blackjack_double_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<GameActionRequest>,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    blackjack_move(request_id, state, request, BlackjackAction::Double).await
}

/// POST /api/blackjack/split
pub async fn blackjack_split_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<GameActionRequest>,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    blackjack_move(request_id, state, request, BlackjackAction::Split).await
}

/// POST /api/mines/start
pub async fn mines_start_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartMinesRequest>,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    let update = state
        .service
        .start_mines(request.user_id, request.bet_amount, request.mine_count)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok(Json(update.into()))
}

/// POST /api/mines/reveal
pub async fn mines_reveal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<RevealRequest>,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    let update = state
        .service
        .reveal_mine(request.user_id, request.game_id, request.cell)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok(Json(update.into()))
}

/// POST /api/mines/cashout
pub async fn mines_cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<GameActionRequest>,
) -> Result<Json<GameUpdateResponse>, ApiError> {
    let update = state
        .service
        .cash_out_mines(request.user_id, request.game_id)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok(Json(update.into()))
}

/// GET /api/games/:id
pub async fn game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
) -> Result<Json<GameView>, ApiError> {
    let game = state
        .store
        .game(game_id)
        .await
        .map_err(rewards_error(&request_id))?
        .ok_or_else(|| ApiError::not_found(request_id.0.clone(), format!("Game {} not found", game_id)))?;
    Ok(Json(GameView::from(&game)))
}

/// GET /api/settings/:kind
pub async fn settings_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<GameSettings>, ApiError> {
    let kind = parse_kind(&request_id, &kind)?;
    let settings = state
        .store
        .game_settings(kind)
        .await
        .map_err(rewards_error(&request_id))?;
    Ok(Json(settings))
}

/// PUT /api/settings/:kind
pub async fn update_settings_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(kind): Path<String>,
    Json(settings): Json<GameSettings>,
) -> Result<Json<GameSettings>, ApiError> {
    check_operator_key(&headers, state.operator_key.as_deref(), &request_id.0)?;
    let kind = parse_kind(&request_id, &kind)?;
    if settings.min_bet <= 0 || settings.max_bet < settings.min_bet {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            format!("invalid limits: min_bet={} max_bet={}", settings.min_bet, settings.max_bet),
        ));
    }
    state
        .store
        .put_game_settings(kind, settings.clone())
        .await
        .map_err(rewards_error(&request_id))?;
    info!(kind = %kind, enabled = settings.enabled, min_bet = settings.min_bet, max_bet = settings.max_bet, "game settings updated");
    Ok(Json(settings))
}

/// POST /api/cleanup/run
pub async fn cleanup_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CleanupReport>, ApiError> {
    check_operator_key(&headers, state.operator_key.as_deref(), &request_id.0)?;
    info!(request_id = %request_id.0, "manual cleanup run requested");
    let report = state.scanner.run_once().await.map_err(rewards_error(&request_id))?;
    Ok(Json(report))
}
