use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::game::PlayerIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    BuyIn,
    BuyOut,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::BuyIn => "buy_in",
            EntryType::BuyOut => "buy_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy_in" => Some(EntryType::BuyIn),
            "buy_out" => Some(EntryType::BuyOut),
            _ => None,
        }
    }
}

/// One immutable cash movement. Amounts are never negative; direction is
/// carried by `entry_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashEntry {
    pub id: Uuid,
    pub game_id: Uuid,
    pub game_player_id: Uuid,
    pub identity: PlayerIdentity,
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub notes: Option<String>,
    pub chip_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub seq: i64,
}

#[derive(Debug, Clone)]
pub struct NewCashEntry {
    pub game_id: Uuid,
    pub game_player_id: Uuid,
    pub identity: PlayerIdentity,
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub notes: Option<String>,
    pub chip_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub total_buy_ins: Decimal,
    pub total_buy_outs: Decimal,
    pub current_profit: Decimal,
}

impl Position {
    /// Folds a player's entries into totals. `None` when a total overflows.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CashEntry>) -> Option<Self> {
        let mut position = Position::default();
        for entry in entries {
            match entry.entry_type {
                EntryType::BuyIn => {
                    position.total_buy_ins = position.total_buy_ins.checked_add(entry.amount)?
                }
                EntryType::BuyOut => {
                    position.total_buy_outs = position.total_buy_outs.checked_add(entry.amount)?
                }
            }
        }
        position.current_profit = position.total_buy_outs.checked_sub(position.total_buy_ins)?;
        Some(position)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub identity: PlayerIdentity,
    pub display_name: String,
    pub games_played: usize,
    pub total_buy_ins: Decimal,
    pub total_buy_outs: Decimal,
    pub total_profit: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entry_type: EntryType, amount: i64) -> CashEntry {
        CashEntry {
            id: Uuid::new_v4(),
            game_id: Uuid::nil(),
            game_player_id: Uuid::nil(),
            identity: PlayerIdentity::Anonymous(Uuid::nil()),
            amount: Decimal::from(amount),
            entry_type,
            notes: None,
            chip_count: None,
            created_at: Utc::now(),
            seq: 0,
        }
    }

    #[test]
    fn position_profit_is_buy_outs_minus_buy_ins() {
        let entries = vec![
            entry(EntryType::BuyIn, 100),
            entry(EntryType::BuyIn, 50),
            entry(EntryType::BuyOut, 80),
        ];
        let position = Position::from_entries(&entries).unwrap();
        assert_eq!(position.total_buy_ins, Decimal::from(150));
        assert_eq!(position.total_buy_outs, Decimal::from(80));
        assert_eq!(position.current_profit, Decimal::from(-70));
    }

    #[test]
    fn empty_ledger_is_flat() {
        let position = Position::from_entries(&Vec::<CashEntry>::new());
        assert_eq!(position, Some(Position::default()));
    }

    #[test]
    fn overflowing_totals_yield_none() {
        let mut a = entry(EntryType::BuyIn, 0);
        a.amount = Decimal::MAX;
        let b = a.clone();
        assert_eq!(Position::from_entries(&[a, b]), None);
    }

    #[test]
    fn entry_type_round_trips_storage_names() {
        for t in [EntryType::BuyIn, EntryType::BuyOut] {
            assert_eq!(EntryType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EntryType::parse("refund"), None);
    }
}
