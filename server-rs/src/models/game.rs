use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::{EntryType, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Active,
    Completed,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GameStatus::Active),
            "completed" => Some(GameStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: Uuid,
    pub league_id: Uuid,
    pub status: GameStatus,
    pub created_by: Uuid,
    pub buy_in: Decimal,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Game {
    pub fn is_active(&self) -> bool {
        self.status == GameStatus::Active
    }
}

/// Who is sitting in a seat: a league member or an anonymous stand-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PlayerIdentity {
    Registered(Uuid),
    Anonymous(Uuid),
}

impl PlayerIdentity {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            PlayerIdentity::Registered(id) => Some(*id),
            PlayerIdentity::Anonymous(_) => None,
        }
    }

    pub fn anonymous_id(&self) -> Option<Uuid> {
        match self {
            PlayerIdentity::Registered(_) => None,
            PlayerIdentity::Anonymous(id) => Some(*id),
        }
    }

    /// Rebuilds the variant from the two nullable storage columns.
    pub fn from_columns(user_id: Option<Uuid>, anonymous_id: Option<Uuid>) -> Option<Self> {
        match (user_id, anonymous_id) {
            (Some(u), None) => Some(PlayerIdentity::Registered(u)),
            (None, Some(a)) => Some(PlayerIdentity::Anonymous(a)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
    pub id: Uuid,
    pub game_id: Uuid,
    pub identity: PlayerIdentity,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    /// Cached settlement. The ledger is authoritative.
    pub final_amount: Option<Decimal>,
    pub profit: Option<Decimal>,
}

impl GamePlayer {
    pub fn new(game_id: Uuid, identity: PlayerIdentity, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            identity,
            is_active: true,
            joined_at: now,
            left_at: None,
            final_amount: None,
            profit: None,
        }
    }

    /// A snapshot is stale when it disagrees with the ledger, or when an
    /// inactive player has none at all.
    pub fn snapshot_is_stale(&self, position: &Position) -> bool {
        match (self.final_amount, self.profit) {
            (Some(amount), Some(profit)) => {
                amount != position.total_buy_outs || profit != position.current_profit
            }
            (None, None) => !self.is_active,
            _ => true,
        }
    }

    pub fn apply_snapshot(&mut self, position: &Position) {
        self.final_amount = Some(position.total_buy_outs);
        self.profit = Some(position.current_profit);
    }

    pub fn clear_snapshot(&mut self) {
        self.final_amount = None;
        self.profit = None;
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub game_player_id: Uuid,
    pub identity: PlayerIdentity,
    pub display_name: String,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub position: Position,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub game_id: Uuid,
    pub total_buy_ins: Decimal,
    pub total_buy_outs: Decimal,
    pub net: Decimal,
    pub is_balanced: bool,
    pub active_players: usize,
    pub total_players: usize,
    pub per_player: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDetail {
    pub game: Game,
    pub summary: GameSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    pub league_id: Uuid,
    pub buy_in: Option<Decimal>,
    #[serde(default)]
    pub players: Vec<PlayerIdentity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPlayerRequest {
    pub player: PlayerIdentity,
    pub buy_in: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct RemovePlayerRequest {
    pub player: PlayerIdentity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashRequest {
    pub amount: Decimal,
    pub notes: Option<String>,
    pub chip_count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRequest {
    pub entry_type: Option<EntryType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditTotalsRequest {
    pub total_buy_ins: Decimal,
    pub total_buy_outs: Decimal,
}
