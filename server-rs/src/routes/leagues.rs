use axum::{
    extract::{Path, State},
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{
    CreateAnonymousPlayerRequest, CreateLeagueRequest, JoinLeagueRequest, UploadImageRequest,
};
use crate::routes::{ok, JsonBody, PathParams};
use crate::AppState;

pub async fn create_league(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): JsonBody<CreateLeagueRequest>,
) -> AppResult<Json<Value>> {
    let display_name = body.display_name.as_deref().unwrap_or(user.display_name());
    let created = state
        .leagues
        .create_league(user.id, &body.name, body.buy_in, display_name)
        .await?;
    ok(created)
}

pub async fn list_leagues(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    ok(state.leagues.list_leagues(user.id).await?)
}

pub async fn join_league(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): JsonBody<JoinLeagueRequest>,
) -> AppResult<Json<Value>> {
    let display_name = body.display_name.as_deref().unwrap_or(user.display_name());
    let joined = state
        .leagues
        .join_league(user.id, &body.invite_code, display_name)
        .await?;
    ok(joined)
}

pub async fn get_league(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state.leagues.get_league(user.id, league_id).await?)
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state.leagues.list_members(user.id, league_id).await?)
}

pub async fn deactivate_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path((league_id, member_id)), _): PathParams<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    let member = state
        .leagues
        .deactivate_member(user.id, league_id, member_id)
        .await?;
    ok(member)
}

pub async fn regenerate_invite_code(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state.leagues.regenerate_invite_code(user.id, league_id).await?)
}

pub async fn list_anonymous_players(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state
        .leagues
        .list_anonymous_players(user.id, league_id)
        .await?)
}

pub async fn create_anonymous_player(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
    WithRejection(Json(body), _): JsonBody<CreateAnonymousPlayerRequest>,
) -> AppResult<Json<Value>> {
    let player = state
        .leagues
        .create_anonymous_player(user.id, league_id, &body.name)
        .await?;
    ok(player)
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state.leagues.leaderboard(user.id, league_id).await?)
}

pub async fn upload_image(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
    WithRejection(Json(body), _): JsonBody<UploadImageRequest>,
) -> AppResult<Json<Value>> {
    let league = state
        .leagues
        .upload_image(user.id, league_id, &body.image_base64, &body.content_type)
        .await?;
    ok(league)
}

pub async fn list_games(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state.ledger.list_games(user.id, league_id).await?)
}

/// `data` is `null` when no game is running.
pub async fn active_game(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(league_id), _): PathParams<Uuid>,
) -> AppResult<Json<Value>> {
    ok(state
        .ledger
        .active_game_for_league(user.id, league_id)
        .await?)
}
