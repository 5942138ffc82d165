use axum::{
    extract::{Path, State},
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use bytes::Bytes;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{
    AddPlayerRequest, CashRequest, EditTotalsRequest, EntryType, RemovePlayerRequest,
    StartGameRequest, UndoRequest,
};
use crate::routes::{ok, optional_json, JsonBody, PathParams};
use crate::AppState;

pub async fn start_game(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): JsonBody<StartGameRequest>,
) -> AppResult<Json<Value>> {
    let game = state
        .ledger
        .start(user.id, body.league_id, body.buy_in, body.players)
        .await?;
    ok(game)
}

/// Players and totals. Also heals stale player snapshots.
pub async fn get_game(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(game_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state.ledger.game_detail(user.id, game_id).await?)
}

pub async fn end_game(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(game_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state.ledger.end(user.id, game_id).await?)
}

pub async fn game_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(game_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    let detail = state.ledger.settled_detail(user.id, game_id).await?;
    let league = state
        .leagues
        .get_league(user.id, detail.game.league_id)
        .await?;
    let text = state
        .summary
        .generate(&league.league.name, &detail)
        .await?;
    ok(json!({
        "gameId": game_id,
        "summary": text,
        "settlement": detail.summary,
    }))
}

pub async fn add_player(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(game_id), _): PathParams<Uuid>,
    WithRejection(Json(body), _): JsonBody<AddPlayerRequest>,
) -> AppResult<Json<Value>> {
    let player = state
        .ledger
        .add_player(user.id, game_id, body.player, body.buy_in)
        .await?;
    ok(player)
}

pub async fn remove_player(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(game_id), _): PathParams<Uuid>,
    WithRejection(Json(body), _): JsonBody<RemovePlayerRequest>,
) -> AppResult<Json<Value>> {
    let player = state
        .ledger
        .remove_player(user.id, game_id, body.player)
        .await?;
    ok(player)
}

pub async fn reactivate_player(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path((game_id, game_player_id)), _): PathParams<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    let player = state
        .ledger
        .reactivate(user.id, game_id, game_player_id)
        .await?;
    ok(player)
}

async fn record_cash(
    state: &AppState,
    user: &AuthUser,
    game_id: Uuid,
    game_player_id: Uuid,
    entry_type: EntryType,
    body: CashRequest,
) -> AppResult<Json<Value>> {
    let entry = state
        .ledger
        .record(
            user.id,
            game_id,
            game_player_id,
            entry_type,
            body.amount,
            body.notes,
            body.chip_count,
        )
        .await?;
    ok(entry)
}

pub async fn buy_in(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path((game_id, game_player_id)), _): PathParams<(Uuid, Uuid)>,
    WithRejection(Json(body), _): JsonBody<CashRequest>,
) -> AppResult<Json<Value>> {
    record_cash(&state, &user, game_id, game_player_id, EntryType::BuyIn, body).await
}

/// Books a buy-out without changing the player's seat.
pub async fn buy_out(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path((game_id, game_player_id)), _): PathParams<(Uuid, Uuid)>,
    WithRejection(Json(body), _): JsonBody<CashRequest>,
) -> AppResult<Json<Value>> {
    record_cash(&state, &user, game_id, game_player_id, EntryType::BuyOut, body).await
}

pub async fn cash_out(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path((game_id, game_player_id)), _): PathParams<(Uuid, Uuid)>,
    WithRejection(Json(body), _): JsonBody<CashRequest>,
) -> AppResult<Json<Value>> {
    let player = state
        .ledger
        .deactivate(user.id, game_id, game_player_id, body.amount)
        .await?;
    ok(player)
}

/// Body is optional; an empty body or `{}` undoes the last buy-in.
pub async fn undo(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path((game_id, game_player_id)), _): PathParams<(Uuid, Uuid)>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let request: UndoRequest = optional_json(&body)?;
    let entry_type = request.entry_type.unwrap_or(EntryType::BuyIn);
    let removed = state
        .ledger
        .undo_last(user.id, game_id, game_player_id, entry_type)
        .await?;
    ok(removed)
}

pub async fn edit_totals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path((game_id, game_player_id)), _): PathParams<(Uuid, Uuid)>,
    WithRejection(Json(body), _): JsonBody<EditTotalsRequest>,
) -> AppResult<Json<Value>> {
    let player = state
        .ledger
        .edit_totals(
            user.id,
            game_id,
            game_player_id,
            body.total_buy_ins,
            body.total_buy_outs,
        )
        .await?;
    ok(player)
}

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path((game_id, game_player_id)), _): PathParams<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    let entries = state
        .ledger
        .list_for(user.id, game_id, game_player_id)
        .await?;
    ok(entries)
}
