//! HTTP tests for the league ledger API against the in-memory store.

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use league_ledger_api::config::Config;
use league_ledger_api::middleware::auth::issue_access_token;
use league_ledger_api::{build_router, AppState};
use serde_json::{json, Value};
use uuid::Uuid;

struct Harness {
    server: TestServer,
    secret: String,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config::for_memory())
    }

    fn with_config(config: Config) -> Self {
        let state = AppState::in_memory(config);
        let secret = state.config.jwt.secret.clone();
        let server = TestServer::new(build_router(state)).unwrap();
        Self { server, secret }
    }

    fn token(&self, user: Uuid, name: &str) -> HeaderValue {
        let token = issue_access_token(user, Some(name), &self.secret, 3600).unwrap();
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }

    async fn post(&self, user: (Uuid, &str), path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .server
            .post(path)
            .add_header(AUTHORIZATION, self.token(user.0, user.1))
            .json(&body)
            .await;
        (response.status_code(), response.json())
    }

    async fn put(&self, user: (Uuid, &str), path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .server
            .put(path)
            .add_header(AUTHORIZATION, self.token(user.0, user.1))
            .json(&body)
            .await;
        (response.status_code(), response.json())
    }

    async fn get(&self, user: (Uuid, &str), path: &str) -> (StatusCode, Value) {
        let response = self
            .server
            .get(path)
            .add_header(AUTHORIZATION, self.token(user.0, user.1))
            .await;
        (response.status_code(), response.json())
    }
}

fn id(value: &Value) -> String {
    value.as_str().unwrap().to_string()
}

/// League owned by `owner` with `guest` joined and a buy-in of 100.
async fn league_with_guest(h: &Harness, owner: (Uuid, &str), guest: (Uuid, &str)) -> (String, String) {
    let (status, body) = h
        .post(owner, "/api/v1/leagues", json!({ "name": "Thursday Night", "buyIn": "100" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let league_id = id(&body["data"]["league"]["id"]);
    let code = id(&body["data"]["league"]["inviteCode"]);

    let (status, body) = h
        .post(guest, "/api/v1/leagues/join", json!({ "inviteCode": code.to_lowercase() }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["memberCount"], 2);
    (league_id, code)
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new();
    let response = h.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn api_requires_a_bearer_token() {
    let h = Harness::new();
    let response = h.server.get("/api/v1/leagues").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let response = h
        .server
        .get("/api/v1/leagues")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_game_round_trip() {
    let h = Harness::new();
    let owner = (Uuid::new_v4(), "Owner");
    let guest = (Uuid::new_v4(), "Guest");
    let (league_id, _) = league_with_guest(&h, owner, guest).await;

    let (status, body) = h
        .post(
            owner,
            "/api/v1/games",
            json!({
                "leagueId": league_id,
                "players": [
                    { "kind": "registered", "id": owner.0 },
                    { "kind": "registered", "id": guest.0 }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let game_id = id(&body["data"]["id"]);
    assert_eq!(body["data"]["status"], "active");

    let (_, body) = h
        .get(guest, &format!("/api/v1/leagues/{league_id}/games/active"))
        .await;
    assert_eq!(id(&body["data"]["id"]), game_id);

    let (status, body) = h.get(owner, &format!("/api/v1/games/{game_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let summary = &body["data"]["summary"];
    assert_eq!(summary["totalBuyIns"], "200");
    assert_eq!(summary["activePlayers"], 2);
    let seat = |user: Uuid| {
        summary["perPlayer"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["identity"]["id"] == json!(user))
            .map(|p| id(&p["gamePlayerId"]))
            .unwrap()
    };
    let (owner_seat, guest_seat) = (seat(owner.0), seat(guest.0));

    let (status, _) = h
        .post(
            guest,
            &format!("/api/v1/games/{game_id}/players/{guest_seat}/buy-in"),
            json!({ "amount": "50", "notes": "rebuy" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = h
        .post(
            guest,
            &format!("/api/v1/games/{game_id}/players/{guest_seat}/undo"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount"], "50");

    let (status, body) = h
        .post(
            owner,
            &format!("/api/v1/games/{game_id}/players/{owner_seat}/cash-out"),
            json!({ "amount": "80" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);
    assert_eq!(body["data"]["profit"], "-20");

    let (status, body) = h.post(owner, &format!("/api/v1/games/{game_id}/end"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "PLAYERS_STILL_ACTIVE");
    assert_eq!(body["error"]["activePlayersCount"], 1);

    let (status, body) = h
        .get(owner, &format!("/api/v1/games/{game_id}/summary"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "GAME_STILL_ACTIVE");

    h.post(
        guest,
        &format!("/api/v1/games/{game_id}/players/{guest_seat}/cash-out"),
        json!({ "amount": "150" }),
    )
    .await;
    let (status, body) = h.post(owner, &format!("/api/v1/games/{game_id}/end"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "completed");
    assert!(body["data"]["endedAt"].is_string());

    let (status, body) = h
        .get(owner, &format!("/api/v1/games/{game_id}/summary"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["settlement"]["totalBuyOuts"], "230");
    assert_eq!(body["data"]["settlement"]["isBalanced"], false);
    assert!(body["data"]["summary"].as_str().unwrap().contains("Thursday Night"));

    let (_, body) = h
        .get(guest, &format!("/api/v1/leagues/{league_id}/leaderboard"))
        .await;
    assert_eq!(body["data"][0]["displayName"], "Guest");
    assert_eq!(body["data"][0]["totalProfit"], "50");
}

#[tokio::test]
async fn roster_and_amount_errors_use_the_envelope() {
    let h = Harness::new();
    let owner = (Uuid::new_v4(), "Owner");
    let guest = (Uuid::new_v4(), "Guest");
    let (league_id, _) = league_with_guest(&h, owner, guest).await;

    let (status, body) = h
        .post(
            owner,
            "/api/v1/games",
            json!({
                "leagueId": league_id,
                "players": [{ "kind": "registered", "id": Uuid::new_v4() }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "ROSTER_INVALID");

    let (_, body) = h
        .post(owner, "/api/v1/games", json!({ "leagueId": league_id }))
        .await;
    let game_id = id(&body["data"]["id"]);

    let (status, body) = h
        .post(owner, "/api/v1/games", json!({ "leagueId": league_id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ACTIVE_GAME_EXISTS");

    let (status, body) = h
        .post(
            owner,
            &format!("/api/v1/games/{game_id}/players"),
            json!({ "player": { "kind": "registered", "id": guest.0 }, "buyIn": "-5" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    let (status, body) = h
        .post(
            owner,
            &format!("/api/v1/games/{game_id}/players"),
            json!({ "player": { "kind": "registered", "id": guest.0 } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let seat = id(&body["data"]["id"]);

    let (status, body) = h
        .post(
            owner,
            &format!("/api/v1/games/{game_id}/players/{seat}/buy-in"),
            json!({ "amount": "0" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    let (status, body) = h
        .post(owner, &format!("/api/v1/games/{game_id}/players"), json!({ "nope": 1 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = h.get(owner, "/api/v1/games/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn edit_totals_is_limited_to_creator_or_admin() {
    let h = Harness::new();
    let owner = (Uuid::new_v4(), "Owner");
    let guest = (Uuid::new_v4(), "Guest");
    let (league_id, _) = league_with_guest(&h, owner, guest).await;

    let (_, body) = h
        .post(
            owner,
            "/api/v1/games",
            json!({
                "leagueId": league_id,
                "players": [{ "kind": "registered", "id": guest.0 }]
            }),
        )
        .await;
    let game_id = id(&body["data"]["id"]);
    let (_, body) = h.get(owner, &format!("/api/v1/games/{game_id}")).await;
    let seat = id(&body["data"]["summary"]["perPlayer"][0]["gamePlayerId"]);
    let path = format!("/api/v1/games/{game_id}/players/{seat}/totals");

    let (status, body) = h
        .put(guest, &path, json!({ "totalBuyIns": "100", "totalBuyOuts": "80" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = h
        .put(owner, &path, json!({ "totalBuyIns": "100", "totalBuyOuts": "80" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profit"], "-20");

    let (_, body) = h
        .get(guest, &format!("/api/v1/games/{game_id}/players/{seat}/entries"))
        .await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["entryType"], "buy_in");
    assert_eq!(entries[1]["entryType"], "buy_out");
}

#[tokio::test]
async fn outsiders_cannot_see_a_league() {
    let h = Harness::new();
    let owner = (Uuid::new_v4(), "Owner");
    let guest = (Uuid::new_v4(), "Guest");
    let (league_id, _) = league_with_guest(&h, owner, guest).await;

    let stranger = (Uuid::new_v4(), "Stranger");
    let (status, body) = h
        .get(stranger, &format!("/api/v1/leagues/{league_id}/members"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, body) = h
        .post(owner, &format!("/api/v1/leagues/{league_id}/anonymous-players"), json!({ "name": "Uncle Joe" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Uncle Joe");

    let (status, body) = h
        .post(
            owner,
            &format!("/api/v1/leagues/{league_id}/image"),
            json!({ "imageBase64": "aGVsbG8=", "contentType": "image/png" }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

/// Starts a game seating `guest` at the league buy-in and returns
/// `(game_id, guest_seat)`.
async fn game_with_guest(h: &Harness, owner: (Uuid, &str), guest: (Uuid, &str)) -> (String, String) {
    let (league_id, _) = league_with_guest(h, owner, guest).await;
    let (status, body) = h
        .post(
            owner,
            "/api/v1/games",
            json!({
                "leagueId": league_id,
                "players": [{ "kind": "registered", "id": guest.0 }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let game_id = id(&body["data"]["id"]);
    let (_, body) = h.get(owner, &format!("/api/v1/games/{game_id}")).await;
    let seat = id(&body["data"]["summary"]["perPlayer"][0]["gamePlayerId"]);
    (game_id, seat)
}

#[tokio::test]
async fn undo_rejects_a_malformed_body_instead_of_defaulting() {
    let h = Harness::new();
    let owner = (Uuid::new_v4(), "Owner");
    let guest = (Uuid::new_v4(), "Guest");
    let (game_id, seat) = game_with_guest(&h, owner, guest).await;
    let undo = format!("/api/v1/games/{game_id}/players/{seat}/undo");
    let entries = format!("/api/v1/games/{game_id}/players/{seat}/entries");

    for body in [json!({ "entryType": "buy-out" }), json!({ "entryType": 7 }), json!([])] {
        let (status, response) = h.post(guest, &undo, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"]["code"], "VALIDATION_ERROR");
    }
    let (_, body) = h.get(guest, &entries).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // no body at all keeps the buy-in default
    let response = h
        .server
        .post(&undo)
        .add_header(AUTHORIZATION, h.token(guest.0, guest.1))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["entryType"], "buy_in");
    assert_eq!(body["data"]["amount"], "100");
}

#[tokio::test]
async fn sub_cent_and_oversized_amounts_are_invalid() {
    let h = Harness::new();
    let owner = (Uuid::new_v4(), "Owner");
    let guest = (Uuid::new_v4(), "Guest");
    let (game_id, seat) = game_with_guest(&h, owner, guest).await;
    let buy_in = format!("/api/v1/games/{game_id}/players/{seat}/buy-in");

    for amount in ["0.001", "10000000000"] {
        let (status, body) = h.post(guest, &buy_in, json!({ "amount": amount })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{amount}");
        assert_eq!(body["error"]["code"], "INVALID_AMOUNT");
    }
    let (status, _) = h.post(guest, &buy_in, json!({ "amount": "12.50" })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_budgets_are_per_user() {
    let mut config = Config::for_memory();
    config.rate_limit.max_requests = 2;
    let h = Harness::with_config(config);
    let alice = (Uuid::new_v4(), "Alice");
    let bob = (Uuid::new_v4(), "Bob");

    for _ in 0..2 {
        let (status, _) = h.get(alice, "/api/v1/leagues").await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = h.get(alice, "/api/v1/leagues").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    let (status, _) = h.get(bob, "/api/v1/leagues").await;
    assert_eq!(status, StatusCode::OK);
}
