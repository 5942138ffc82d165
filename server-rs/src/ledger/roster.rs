use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{EntryType, GamePlayer, NewCashEntry, PlayerIdentity};
use crate::store::{CashEntryRepo, GamePlayerRepo};

use super::entries::check_bounds;
use super::{
    check_identity, lock_active_game, refresh_snapshot, require_member, Ledger, LedgerError,
    LedgerResult,
};

impl Ledger {
    /// Seats a player. A previously removed player gets their old row back
    /// rather than a second one.
    pub async fn add_player(
        &self,
        actor: Uuid,
        game_id: Uuid,
        identity: PlayerIdentity,
        buy_in_override: Option<Decimal>,
    ) -> LedgerResult<GamePlayer> {
        if let Some(amount) = buy_in_override {
            check_bounds(amount, "Buy-in")?;
        }

        let mut tx = self.store.begin().await?;
        let game = lock_active_game(tx.as_mut(), game_id).await?;
        require_member(tx.as_mut(), game.league_id, actor).await?;
        check_identity(tx.as_mut(), game.league_id, &identity).await?;

        let now = Utc::now();
        let (mut player, reactivated) = match tx.find_game_player(game_id, &identity).await? {
            Some(existing) if existing.is_active => return Err(LedgerError::AlreadyActive),
            Some(mut existing) => {
                existing.is_active = true;
                existing.left_at = None;
                existing.clear_snapshot();
                tx.update_game_player(&existing).await?;
                (existing, true)
            }
            None => {
                let player = GamePlayer::new(game_id, identity, now);
                tx.insert_game_player(&player).await?;
                (player, false)
            }
        };

        let buy_in = buy_in_override.unwrap_or(game.buy_in);
        if buy_in > Decimal::ZERO {
            tx.insert_cash_entry(NewCashEntry {
                game_id,
                game_player_id: player.id,
                identity,
                amount: buy_in,
                entry_type: EntryType::BuyIn,
                notes: None,
                chip_count: None,
                created_at: now,
            })
            .await?;
        }
        refresh_snapshot(tx.as_mut(), &mut player).await?;
        tx.commit().await?;

        tracing::info!(
            %game_id,
            game_player_id = %player.id,
            reactivated,
            %buy_in,
            "player seated"
        );
        Ok(player)
    }

    /// Soft-removes a seated player without booking a buy-out.
    pub async fn remove_player(
        &self,
        actor: Uuid,
        game_id: Uuid,
        identity: PlayerIdentity,
    ) -> LedgerResult<GamePlayer> {
        let mut tx = self.store.begin().await?;
        let game = lock_active_game(tx.as_mut(), game_id).await?;
        require_member(tx.as_mut(), game.league_id, actor).await?;

        let mut player = tx
            .find_game_player(game_id, &identity)
            .await?
            .ok_or(LedgerError::PlayerNotInGame)?;
        if !player.is_active {
            return Err(LedgerError::PlayerAlreadyInactive);
        }

        player.is_active = false;
        player.left_at = Some(Utc::now());
        let position = refresh_snapshot(tx.as_mut(), &mut player).await?;
        tx.commit().await?;

        tracing::info!(
            %game_id,
            game_player_id = %player.id,
            profit = %position.current_profit,
            "player removed"
        );
        Ok(player)
    }
}
