//! API route handlers.
//!
//! Thin JSON adapters over [`Sportsbook`]: every handler parses, calls one
//! book operation and serializes. State is shared via `Arc<Sportsbook>`.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::engine::odds;
use crate::engine::{BettingStats, GameSettlement, Sportsbook};
use crate::types::{
    Account, AccountId, Game, GameEvent, GameId, GameStatus, PlacementRequest, Wager, WagerError,
};

pub type AppState = Arc<Sportsbook>;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_GAMES_LIMIT: usize = 20;
const MAX_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Wager(WagerError),
    BadRequest(String),
}

impl From<WagerError> for ApiError {
    fn from(e: WagerError) -> Self {
        ApiError::Wager(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn status_for(e: &WagerError) -> StatusCode {
    match e {
        WagerError::Validation(_) | WagerError::InvalidOdds(_) => StatusCode::BAD_REQUEST,
        WagerError::AccountNotFound(_)
        | WagerError::GameNotFound(_)
        | WagerError::WagerNotFound(_) => StatusCode::NOT_FOUND,
        WagerError::InsufficientFunds { .. }
        | WagerError::GameAlreadyStarted(_)
        | WagerError::ResultConflict { .. } => StatusCode::CONFLICT,
        WagerError::DataInconsistency(_) | WagerError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Wager(e) => (status_for(&e), e.kind(), e.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
        };
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct OpenAccountRequest {
    #[serde(default)]
    pub starting_balance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

impl LimitParams {
    fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).min(MAX_LIMIT)
    }
}

/// Body of `POST /api/games/:id/events`. The game id comes from the path.
#[derive(Debug, Deserialize)]
pub struct GameEventRequest {
    pub status: GameStatus,
    #[serde(default)]
    pub final_home_score: Option<u32>,
    #[serde(default)]
    pub final_away_score: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacementResponse {
    pub wager: Wager,
    pub new_balance: Decimal,
    /// Returned on a win, stake included.
    pub potential_payout: Decimal,
    pub implied_probability: Decimal,
    pub decimal_odds: Decimal,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// POST /api/accounts
pub async fn open_account(State(book): State<AppState>, body: Bytes) -> ApiResult<(StatusCode, Json<Account>)> {
    let req: OpenAccountRequest = if body.iter().all(u8::is_ascii_whitespace) {
        OpenAccountRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let account = book.open_account(req.starting_balance).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/accounts/:id
pub async fn get_account(State(book): State<AppState>, Path(id): Path<AccountId>) -> ApiResult<Json<Account>> {
    Ok(Json(book.account(id).await?))
}

/// GET /api/accounts/:id/stats
pub async fn get_stats(State(book): State<AppState>, Path(id): Path<AccountId>) -> ApiResult<Json<BettingStats>> {
    Ok(Json(book.stats(id).await?))
}

/// GET /api/accounts/:id/wagers
pub async fn get_history(
    State(book): State<AppState>,
    Path(id): Path<AccountId>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<Wager>>> {
    Ok(Json(book.history(id, params.resolve(DEFAULT_HISTORY_LIMIT)).await?))
}

/// POST /api/wagers
pub async fn place_wager(
    State(book): State<AppState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PlacementResponse>)> {
    let Json(req) = payload?;
    let receipt = book.place_wager(&req).await?;
    let wager = receipt.wager;

    let response = PlacementResponse {
        potential_payout: odds::payout_for_win(wager.amount, wager.odds)?,
        implied_probability: odds::implied_probability(wager.odds)?,
        decimal_odds: odds::to_decimal_odds(wager.odds)?,
        new_balance: receipt.new_balance,
        wager,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/games
pub async fn get_games(
    State(book): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<Game>>> {
    Ok(Json(book.upcoming_games(params.resolve(DEFAULT_GAMES_LIMIT)).await?))
}

/// PUT /api/games
pub async fn upsert_game(
    State(book): State<AppState>,
    payload: Result<Json<Game>, JsonRejection>,
) -> ApiResult<Json<Game>> {
    let Json(game) = payload?;
    book.upsert_game(&game).await?;
    Ok(Json(game))
}

/// POST /api/games/:id/events
pub async fn post_game_event(
    State(book): State<AppState>,
    Path(id): Path<GameId>,
    payload: Result<Json<GameEventRequest>, JsonRejection>,
) -> ApiResult<Json<GameSettlement>> {
    let Json(req) = payload?;
    let event = GameEvent {
        game_id: id,
        status: req.status,
        final_home_score: req.final_home_score,
        final_away_score: req.final_away_score,
    };
    Ok(Json(book.handle_game_event(&event).await?))
}

/// POST /api/games/:id/simulate
pub async fn simulate_game(
    State(book): State<AppState>,
    Path(id): Path<GameId>,
) -> ApiResult<Json<GameSettlement>> {
    Ok(Json(book.simulate_game(id).await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
