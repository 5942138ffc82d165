use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware as axum_mw,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use config::Config;
use ledger::Ledger;
use middleware::auth::{IdentityProvider, JwtIdentity};
use middleware::rate_limit::RateLimiter;
use services::{
    HttpObjectStorage, HttpSummaryClient, LeagueDirectory, NoopStorage, ObjectStorage,
    StaticSummary, SummaryService,
};
use store::{MemoryStore, Store};

/// Base64 inflates a 5 MiB image by a third; leave headroom for the JSON.
const IMAGE_BODY_LIMIT: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub ledger: Ledger,
    pub leagues: LeagueDirectory,
    pub identity: Arc<dyn IdentityProvider>,
    pub summary: Arc<dyn SummaryService>,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wires collaborators from config. Unconfigured outbound services fall
    /// back to their local stand-ins.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let storage: Arc<dyn ObjectStorage> =
            match HttpObjectStorage::new(&config.storage, config.outbound_timeout()) {
                Some(client) => Arc::new(client),
                None => {
                    tracing::warn!("STORAGE_BASE_URL not set; image uploads disabled");
                    Arc::new(NoopStorage)
                }
            };
        let summary: Arc<dyn SummaryService> =
            match HttpSummaryClient::new(&config.summary, config.outbound_timeout()) {
                Some(client) => Arc::new(client),
                None => Arc::new(StaticSummary),
            };

        Self {
            ledger: Ledger::new(store.clone()),
            leagues: LeagueDirectory::new(store.clone(), storage),
            identity: Arc::new(JwtIdentity::new(config.jwt.secret.clone())),
            summary,
            rate_limiter: RateLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window_secs,
            ),
            config: Arc::new(config),
            store,
        }
    }

    /// Fresh in-memory state for tests and local runs.
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.cors_origins.is_empty() || config.cors_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    layer.allow_origin(origins)
}

pub fn build_router(state: AppState) -> Router {
    let league_routes = Router::new()
        .route(
            "/",
            post(routes::leagues::create_league).get(routes::leagues::list_leagues),
        )
        .route("/join", post(routes::leagues::join_league))
        .route("/:id", get(routes::leagues::get_league))
        .route("/:id/members", get(routes::leagues::list_members))
        .route(
            "/:id/members/:userId/deactivate",
            post(routes::leagues::deactivate_member),
        )
        .route(
            "/:id/invite-code",
            post(routes::leagues::regenerate_invite_code),
        )
        .route(
            "/:id/anonymous-players",
            get(routes::leagues::list_anonymous_players)
                .post(routes::leagues::create_anonymous_player),
        )
        .route("/:id/leaderboard", get(routes::leagues::leaderboard))
        .route(
            "/:id/image",
            post(routes::leagues::upload_image).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
        .route("/:id/games", get(routes::leagues::list_games))
        .route("/:id/games/active", get(routes::leagues::active_game));

    let game_routes = Router::new()
        .route("/", post(routes::games::start_game))
        .route("/:id", get(routes::games::get_game))
        .route("/:id/end", post(routes::games::end_game))
        .route("/:id/summary", get(routes::games::game_summary))
        .route("/:id/players", post(routes::games::add_player))
        .route("/:id/players/remove", post(routes::games::remove_player))
        .route(
            "/:id/players/:gpId/reactivate",
            post(routes::games::reactivate_player),
        )
        .route("/:id/players/:gpId/buy-in", post(routes::games::buy_in))
        .route("/:id/players/:gpId/buy-out", post(routes::games::buy_out))
        .route("/:id/players/:gpId/cash-out", post(routes::games::cash_out))
        .route("/:id/players/:gpId/undo", post(routes::games::undo))
        .route("/:id/players/:gpId/totals", put(routes::games::edit_totals))
        .route("/:id/players/:gpId/entries", get(routes::games::list_entries));

    // rate_limit runs after authenticate and keys on `AuthUser`
    let api = Router::new()
        .nest("/leagues", league_routes)
        .nest("/games", game_routes)
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let health = Router::new()
        .route("/health", get(routes::health::health))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ));

    Router::new()
        .nest("/api/v1", api)
        .merge(health)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(HandleErrorLayer::new(error::handle_layer_error))
                .layer(TimeoutLayer::new(state.config.request_timeout()))
                .layer(CompressionLayer::new())
                .layer(cors_layer(&state.config)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn timed_out_requests_use_the_error_envelope() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "late"
                }),
            )
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(error::handle_layer_error))
                    .layer(TimeoutLayer::new(Duration::from_millis(10))),
            );

        let response = app
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "REQUEST_TIMEOUT");
    }
}
