use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::SummaryConfig;
use crate::ledger::{LedgerError, LedgerResult};
use crate::models::{GameDetail, PlayerSummary};

/// Writes a short recap of a settled game. Read-only over the settlement.
#[async_trait]
pub trait SummaryService: Send + Sync {
    async fn generate(&self, league_name: &str, detail: &GameDetail) -> LedgerResult<String>;
}

fn ranked(detail: &GameDetail) -> Vec<&PlayerSummary> {
    let mut players: Vec<&PlayerSummary> = detail.summary.per_player.iter().collect();
    players.sort_by(|a, b| {
        b.position
            .current_profit
            .cmp(&a.position.current_profit)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    players
}

/// Plain-text settlement table fed to the model and used as the fallback.
pub fn settlement_lines(league_name: &str, detail: &GameDetail) -> String {
    let summary = &detail.summary;
    let mut out = format!(
        "{league_name} game on {}: {} players, buy-ins {}, buy-outs {}",
        detail.game.started_at.format("%Y-%m-%d"),
        summary.total_players,
        summary.total_buy_ins,
        summary.total_buy_outs,
    );
    if !summary.is_balanced {
        out.push_str(&format!(" (off by {})", summary.net));
    }
    out.push('.');
    for p in ranked(detail) {
        out.push_str(&format!(
            "\n{}: in {}, out {}, {}{}",
            p.display_name,
            p.position.total_buy_ins,
            p.position.total_buy_outs,
            if p.position.current_profit.is_sign_negative() { "" } else { "+" },
            p.position.current_profit,
        ));
    }
    out
}

/// Deterministic recap used when no model endpoint is configured.
pub struct StaticSummary;

#[async_trait]
impl SummaryService for StaticSummary {
    async fn generate(&self, league_name: &str, detail: &GameDetail) -> LedgerResult<String> {
        Ok(settlement_lines(league_name, detail))
    }
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct HttpSummaryClient {
    api_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpSummaryClient {
    pub fn new(config: &SummaryConfig, timeout: Duration) -> Option<Self> {
        if config.api_key.is_empty() {
            return None;
        }
        let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
        Some(Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl SummaryService for HttpSummaryClient {
    async fn generate(&self, league_name: &str, detail: &GameDetail) -> LedgerResult<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You write short, light-hearted recaps of home poker games. \
                                Use only the numbers given. Three sentences at most."
                },
                { "role": "user", "content": settlement_lines(league_name, detail) }
            ],
            "max_tokens": 200
        });

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Internal(format!("Summary request failed: {e}")))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| LedgerError::Internal(format!("Summary response parse failed: {e}")))?;
        if !status.is_success() {
            let msg = body["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(LedgerError::Internal(format!("Summary service error: {msg}")));
        }

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LedgerError::Internal("Summary response had no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::models::{Game, GameStatus, GameSummary, PlayerIdentity, Position};

    fn player(name: &str, ins: i64, outs: i64) -> PlayerSummary {
        PlayerSummary {
            game_player_id: Uuid::new_v4(),
            identity: PlayerIdentity::Registered(Uuid::new_v4()),
            display_name: name.into(),
            is_active: false,
            joined_at: Utc::now(),
            left_at: Some(Utc::now()),
            position: Position {
                total_buy_ins: Decimal::from(ins),
                total_buy_outs: Decimal::from(outs),
                current_profit: Decimal::from(outs - ins),
            },
        }
    }

    #[tokio::test]
    async fn static_summary_ranks_winners_first() {
        let game_id = Uuid::new_v4();
        let detail = GameDetail {
            game: Game {
                id: game_id,
                league_id: Uuid::new_v4(),
                status: GameStatus::Completed,
                created_by: Uuid::new_v4(),
                buy_in: Decimal::from(100),
                started_at: Utc::now(),
                ended_at: Some(Utc::now()),
            },
            summary: GameSummary {
                game_id,
                total_buy_ins: Decimal::from(200),
                total_buy_outs: Decimal::from(230),
                net: Decimal::from(30),
                is_balanced: false,
                active_players: 0,
                total_players: 2,
                per_player: vec![player("Alice", 100, 80), player("Bob", 100, 150)],
            },
        };

        let text = StaticSummary.generate("Thursday", &detail).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("2 players"));
        assert!(lines[0].contains("off by 30"));
        assert_eq!(lines[1], "Bob: in 100, out 150, +50");
        assert_eq!(lines[2], "Alice: in 100, out 80, -20");
    }
}
