use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{EntryType, GamePlayer, NewCashEntry, Position};
use crate::store::{CashEntryRepo, GamePlayerRepo};

use super::entries::{check_bounds, validate_amount};
use super::{
    lock_active_game, player_in_game, position_of, refresh_snapshot, require_member, Ledger,
    LedgerError, LedgerResult,
};

impl Ledger {
    /// Position recomputed from the ledger, never from the cached snapshot.
    pub async fn compute_position(&self, game_player_id: Uuid) -> LedgerResult<Position> {
        let mut tx = self.store.begin().await?;
        if tx.get_game_player(game_player_id).await?.is_none() {
            return Err(LedgerError::PlayerNotInGame);
        }
        let entries = tx.list_cash_entries(game_player_id).await?;
        position_of(&entries)
    }

    /// Cashes a player out: the buy-out entry is written before the status
    /// flip, inside one transaction holding the game lock.
    pub async fn deactivate(
        &self,
        actor: Uuid,
        game_id: Uuid,
        game_player_id: Uuid,
        final_cash_out: Decimal,
    ) -> LedgerResult<GamePlayer> {
        validate_amount(EntryType::BuyOut, final_cash_out)?;

        let mut tx = self.store.begin().await?;
        let game = lock_active_game(tx.as_mut(), game_id).await?;
        require_member(tx.as_mut(), game.league_id, actor).await?;
        let mut player = player_in_game(tx.as_mut(), game_id, game_player_id).await?;
        if !player.is_active {
            return Err(LedgerError::PlayerAlreadyInactive);
        }

        let now = Utc::now();
        tx.insert_cash_entry(NewCashEntry {
            game_id,
            game_player_id,
            identity: player.identity,
            amount: final_cash_out,
            entry_type: EntryType::BuyOut,
            notes: None,
            chip_count: None,
            created_at: now,
        })
        .await?;

        player.is_active = false;
        player.left_at = Some(now);
        let position = refresh_snapshot(tx.as_mut(), &mut player).await?;
        tx.commit().await?;

        tracing::info!(
            %game_id,
            %game_player_id,
            cash_out = %final_cash_out,
            profit = %position.current_profit,
            "player cashed out"
        );
        Ok(player)
    }

    /// Seats an inactive player again. Ledger history is left untouched.
    pub async fn reactivate(
        &self,
        actor: Uuid,
        game_id: Uuid,
        game_player_id: Uuid,
    ) -> LedgerResult<GamePlayer> {
        let mut tx = self.store.begin().await?;
        let game = lock_active_game(tx.as_mut(), game_id).await?;
        require_member(tx.as_mut(), game.league_id, actor).await?;
        let mut player = player_in_game(tx.as_mut(), game_id, game_player_id).await?;
        if player.is_active {
            return Err(LedgerError::AlreadyActive);
        }

        player.is_active = true;
        player.left_at = None;
        player.clear_snapshot();
        tx.update_game_player(&player).await?;
        tx.commit().await?;

        tracing::info!(%game_id, %game_player_id, "player reactivated");
        Ok(player)
    }

    /// Administrative override. Discards the player's whole entry history and
    /// replaces it with at most one buy-in and one buy-out carrying the totals.
    pub async fn edit_totals(
        &self,
        actor: Uuid,
        game_id: Uuid,
        game_player_id: Uuid,
        total_buy_ins: Decimal,
        total_buy_outs: Decimal,
    ) -> LedgerResult<GamePlayer> {
        check_bounds(total_buy_ins, "Total buy-ins")?;
        check_bounds(total_buy_outs, "Total buy-outs")?;

        let mut tx = self.store.begin().await?;
        let game = lock_active_game(tx.as_mut(), game_id).await?;
        let member = require_member(tx.as_mut(), game.league_id, actor).await?;
        if game.created_by != actor && !member.is_admin() {
            return Err(LedgerError::forbidden(
                "Only the game creator or a league admin can edit totals",
            ));
        }
        let mut player = player_in_game(tx.as_mut(), game_id, game_player_id).await?;

        let discarded = tx.delete_player_entries(game_player_id).await?;
        let now = Utc::now();
        for (entry_type, amount) in [
            (EntryType::BuyIn, total_buy_ins),
            (EntryType::BuyOut, total_buy_outs),
        ] {
            if amount > Decimal::ZERO {
                tx.insert_cash_entry(NewCashEntry {
                    game_id,
                    game_player_id,
                    identity: player.identity,
                    amount,
                    entry_type,
                    notes: Some("edited totals".into()),
                    chip_count: None,
                    created_at: now,
                })
                .await?;
            }
        }

        let entries = tx.list_cash_entries(game_player_id).await?;
        let position = position_of(&entries)?;
        player.apply_snapshot(&position);
        tx.update_game_player(&player).await?;
        tx.commit().await?;

        tracing::warn!(
            %game_id,
            %game_player_id,
            discarded,
            %total_buy_ins,
            %total_buy_outs,
            "player totals overwritten"
        );
        Ok(player)
    }
}
