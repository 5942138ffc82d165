//! Game ledger: cash entries, player positions, the game lifecycle, the
//! roster gate and settlement.
//!
//! Balances are never stored authoritatively. Every read recomputes them from
//! `cash_entries`; the `final_amount`/`profit` columns on a game player are a
//! cache that each mutation refreshes and that [`Ledger::repair_snapshots`]
//! heals after a partial failure.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{CashEntry, Game, GamePlayer, LeagueMember, PlayerIdentity, Position};
use crate::store::{CashEntryRepo, GamePlayerRepo, GameRepo, MemberRepo, Store, StoreTxn};

pub mod entries;
pub mod error;
pub mod lifecycle;
pub mod position;
pub mod roster;
pub mod settlement;

pub use error::{LedgerError, LedgerResult};

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

/// The actor must hold an active membership in the league.
pub(crate) async fn require_member<T: StoreTxn + ?Sized>(
    tx: &mut T,
    league_id: Uuid,
    user_id: Uuid,
) -> LedgerResult<LeagueMember> {
    match tx.find_member(league_id, user_id).await? {
        Some(member) if member.is_active => Ok(member),
        _ => Err(LedgerError::forbidden("Not a member of this league")),
    }
}

/// Locks the game row; all writes against one game serialize here.
async fn lock_game<T: StoreTxn + ?Sized>(tx: &mut T, game_id: Uuid) -> LedgerResult<Game> {
    tx.lock_game(game_id)
        .await?
        .ok_or(LedgerError::NotFound("Game"))
}

async fn lock_active_game<T: StoreTxn + ?Sized>(tx: &mut T, game_id: Uuid) -> LedgerResult<Game> {
    let game = lock_game(tx, game_id).await?;
    if !game.is_active() {
        return Err(LedgerError::GameNotActive);
    }
    Ok(game)
}

async fn player_in_game<T: StoreTxn + ?Sized>(
    tx: &mut T,
    game_id: Uuid,
    game_player_id: Uuid,
) -> LedgerResult<GamePlayer> {
    match tx.get_game_player(game_player_id).await? {
        Some(player) if player.game_id == game_id => Ok(player),
        _ => Err(LedgerError::PlayerNotInGame),
    }
}

/// A registered identity must be an active member; an anonymous one must
/// belong to the league.
async fn check_identity<T: StoreTxn + ?Sized>(
    tx: &mut T,
    league_id: Uuid,
    identity: &PlayerIdentity,
) -> LedgerResult<()> {
    match identity {
        PlayerIdentity::Registered(user_id) => match tx.find_member(league_id, *user_id).await? {
            Some(member) if member.is_active => Ok(()),
            _ => Err(LedgerError::NotLeagueMember),
        },
        PlayerIdentity::Anonymous(id) => match tx.get_anonymous_player(*id).await? {
            Some(player) if player.league_id == league_id => Ok(()),
            _ => Err(LedgerError::NotFound("Anonymous player")),
        },
    }
}

/// Position from a set of entries; an overflowing total is an internal fault
/// since every stored amount is bounded.
fn position_of<'a>(entries: impl IntoIterator<Item = &'a CashEntry>) -> LedgerResult<Position> {
    Position::from_entries(entries)
        .ok_or_else(|| LedgerError::Internal("cash totals overflowed".into()))
}

fn checked_total(amounts: impl IntoIterator<Item = Decimal>) -> LedgerResult<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| LedgerError::Internal("cash totals overflowed".into()))
}

/// Recomputes the player's position from the ledger and rewrites the cached
/// snapshot if it no longer matches.
async fn refresh_snapshot<T: StoreTxn + ?Sized>(
    tx: &mut T,
    player: &mut GamePlayer,
) -> LedgerResult<Position> {
    let entries = tx.list_cash_entries(player.id).await?;
    let position = position_of(&entries)?;
    if player.snapshot_is_stale(&position) {
        player.apply_snapshot(&position);
        tx.update_game_player(player).await?;
    }
    Ok(position)
}
