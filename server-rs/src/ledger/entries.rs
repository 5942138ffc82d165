use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{CashEntry, EntryType, NewCashEntry};
use crate::store::{CashEntryRepo, GameRepo};

use super::{
    lock_active_game, player_in_game, refresh_snapshot, require_member, Ledger, LedgerError,
    LedgerResult,
};

/// Largest amount a single entry, buy-in or total may carry. Money columns
/// are `NUMERIC(12, 2)`.
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

/// Bounds shared by every stored amount: not negative, at most two decimal
/// places and no larger than [`max_amount`].
pub fn check_bounds(amount: Decimal, what: &str) -> LedgerResult<()> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::invalid_amount(format!(
            "{what} cannot be negative"
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(LedgerError::invalid_amount(format!(
            "{what} cannot have more than two decimal places"
        )));
    }
    if amount > max_amount() {
        return Err(LedgerError::invalid_amount(format!(
            "{what} cannot exceed {}",
            max_amount()
        )));
    }
    Ok(())
}

/// Buy-ins must be strictly positive; a buy-out of zero is a bust-out.
pub fn validate_amount(entry_type: EntryType, amount: Decimal) -> LedgerResult<()> {
    match entry_type {
        EntryType::BuyIn => {
            check_bounds(amount, "Buy-in amount")?;
            if amount.is_zero() {
                return Err(LedgerError::invalid_amount(
                    "Buy-in amount must be greater than zero",
                ));
            }
            Ok(())
        }
        EntryType::BuyOut => check_bounds(amount, "Buy-out amount"),
    }
}

impl Ledger {
    /// Appends one cash movement for a player of an active game.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        actor: Uuid,
        game_id: Uuid,
        game_player_id: Uuid,
        entry_type: EntryType,
        amount: Decimal,
        notes: Option<String>,
        chip_count: Option<i64>,
    ) -> LedgerResult<CashEntry> {
        validate_amount(entry_type, amount)?;

        let mut tx = self.store.begin().await?;
        let game = lock_active_game(tx.as_mut(), game_id).await?;
        require_member(tx.as_mut(), game.league_id, actor).await?;
        let mut player = player_in_game(tx.as_mut(), game_id, game_player_id).await?;

        if entry_type == EntryType::BuyIn && !player.is_active {
            return Err(LedgerError::PlayerAlreadyInactive);
        }

        let entry = tx
            .insert_cash_entry(NewCashEntry {
                game_id,
                game_player_id,
                identity: player.identity,
                amount,
                entry_type,
                notes,
                chip_count,
                created_at: Utc::now(),
            })
            .await?;
        refresh_snapshot(tx.as_mut(), &mut player).await?;
        tx.commit().await?;

        tracing::info!(
            %game_id,
            %game_player_id,
            entry_type = entry_type.as_str(),
            %amount,
            "cash entry recorded"
        );
        Ok(entry)
    }

    /// Chronological entry history for one player.
    pub async fn list_for(
        &self,
        actor: Uuid,
        game_id: Uuid,
        game_player_id: Uuid,
    ) -> LedgerResult<Vec<CashEntry>> {
        let mut tx = self.store.begin().await?;
        let game = tx
            .get_game(game_id)
            .await?
            .ok_or(LedgerError::NotFound("Game"))?;
        require_member(tx.as_mut(), game.league_id, actor).await?;
        player_in_game(tx.as_mut(), game_id, game_player_id).await?;
        tx.list_cash_entries(game_player_id).await
    }

    /// Hard-deletes the most recent entry of `entry_type` for the player.
    pub async fn undo_last(
        &self,
        actor: Uuid,
        game_id: Uuid,
        game_player_id: Uuid,
        entry_type: EntryType,
    ) -> LedgerResult<CashEntry> {
        let mut tx = self.store.begin().await?;
        let game = lock_active_game(tx.as_mut(), game_id).await?;
        require_member(tx.as_mut(), game.league_id, actor).await?;
        let mut player = player_in_game(tx.as_mut(), game_id, game_player_id).await?;

        let entry = tx
            .latest_cash_entry(game_player_id, entry_type)
            .await?
            .ok_or(LedgerError::NothingToUndo)?;
        tx.delete_cash_entry(entry.id).await?;
        refresh_snapshot(tx.as_mut(), &mut player).await?;
        tx.commit().await?;

        tracing::info!(
            %game_id,
            %game_player_id,
            entry_id = %entry.id,
            entry_type = entry_type.as_str(),
            amount = %entry.amount,
            "cash entry undone"
        );
        Ok(entry)
    }
}
