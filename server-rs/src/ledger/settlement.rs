use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Game, GameDetail, GameSummary, PlayerIdentity, PlayerSummary};
use crate::store::{CashEntryRepo, GamePlayerRepo, GameRepo, MemberRepo, StoreTxn};

use super::{
    checked_total, lock_game, position_of, require_member, Ledger, LedgerError, LedgerResult,
};

impl Ledger {
    /// Game-level totals, recomputed from the ledger on every call.
    pub async fn summarize(&self, game_id: Uuid) -> LedgerResult<GameSummary> {
        let mut tx = self.store.begin().await?;
        let game = tx
            .get_game(game_id)
            .await?
            .ok_or(LedgerError::NotFound("Game"))?;
        summarize_in(tx.as_mut(), &game).await
    }

    /// Rewrites every cached snapshot that disagrees with the ledger.
    /// Returns how many rows were healed.
    pub async fn repair_snapshots(&self, game_id: Uuid) -> LedgerResult<usize> {
        let mut tx = self.store.begin().await?;
        lock_game(tx.as_mut(), game_id).await?;
        let repaired = repair_in(tx.as_mut(), game_id).await?;
        tx.commit().await?;
        Ok(repaired)
    }

    /// Players and totals for one game, as shown on the game screen.
    pub async fn game_detail(&self, actor: Uuid, game_id: Uuid) -> LedgerResult<GameDetail> {
        let mut tx = self.store.begin().await?;
        let game = lock_game(tx.as_mut(), game_id).await?;
        require_member(tx.as_mut(), game.league_id, actor).await?;
        repair_in(tx.as_mut(), game_id).await?;
        let summary = summarize_in(tx.as_mut(), &game).await?;
        tx.commit().await?;
        Ok(GameDetail { game, summary })
    }

    /// Final settlement of a completed game.
    pub async fn settled_detail(&self, actor: Uuid, game_id: Uuid) -> LedgerResult<GameDetail> {
        let detail = self.game_detail(actor, game_id).await?;
        if detail.game.is_active() {
            return Err(LedgerError::GameStillActive);
        }
        Ok(detail)
    }
}

async fn repair_in<T: StoreTxn + ?Sized>(tx: &mut T, game_id: Uuid) -> LedgerResult<usize> {
    let mut repaired = 0;
    for mut player in tx.list_game_players(game_id).await? {
        let entries = tx.list_cash_entries(player.id).await?;
        let position = position_of(&entries)?;
        if player.snapshot_is_stale(&position) {
            player.apply_snapshot(&position);
            tx.update_game_player(&player).await?;
            repaired += 1;
        }
    }
    if repaired > 0 {
        tracing::warn!(%game_id, repaired, "stale player snapshots repaired");
    }
    Ok(repaired)
}

async fn summarize_in<T: StoreTxn + ?Sized>(tx: &mut T, game: &Game) -> LedgerResult<GameSummary> {
    let players = tx.list_game_players(game.id).await?;
    let entries = tx.list_game_entries(game.id).await?;

    let mut names: HashMap<PlayerIdentity, String> = tx
        .list_members(game.league_id)
        .await?
        .into_iter()
        .map(|m| (PlayerIdentity::Registered(m.user_id), m.display_name))
        .collect();
    for anon in tx.list_anonymous_players(game.league_id).await? {
        names.insert(PlayerIdentity::Anonymous(anon.id), anon.name);
    }

    let per_player: Vec<PlayerSummary> = players
        .into_iter()
        .map(|p| {
            let position = position_of(entries.iter().filter(|e| e.game_player_id == p.id))?;
            Ok(PlayerSummary {
                game_player_id: p.id,
                display_name: names
                    .get(&p.identity)
                    .cloned()
                    .unwrap_or_else(|| "Unknown player".to_string()),
                identity: p.identity,
                is_active: p.is_active,
                joined_at: p.joined_at,
                left_at: p.left_at,
                position,
            })
        })
        .collect::<LedgerResult<_>>()?;

    let total_buy_ins = checked_total(per_player.iter().map(|p| p.position.total_buy_ins))?;
    let total_buy_outs = checked_total(per_player.iter().map(|p| p.position.total_buy_outs))?;
    Ok(GameSummary {
        game_id: game.id,
        total_buy_ins,
        total_buy_outs,
        net: total_buy_outs - total_buy_ins,
        is_balanced: total_buy_ins == total_buy_outs,
        active_players: per_player.iter().filter(|p| p.is_active).count(),
        total_players: per_player.len(),
        per_player,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::{dec, Fixture};
    use crate::models::EntryType;
    use crate::store::Store;

    #[tokio::test]
    async fn summary_follows_undo_immediately() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(
                fx.admin,
                fx.league_id,
                None,
                vec![PlayerIdentity::Registered(fx.alice)],
            )
            .await
            .unwrap();
        let gp = fx.ledger.summarize(game.id).await.unwrap().per_player[0].game_player_id;

        fx.ledger
            .record(fx.alice, game.id, gp, EntryType::BuyIn, dec(50), None, None)
            .await
            .unwrap();
        let summary = fx.ledger.summarize(game.id).await.unwrap();
        assert_eq!(summary.per_player[0].position.total_buy_ins, dec(150));
        assert_eq!(summary.per_player[0].display_name, "Alice");

        fx.ledger
            .undo_last(fx.alice, game.id, gp, EntryType::BuyIn)
            .await
            .unwrap();
        let summary = fx.ledger.summarize(game.id).await.unwrap();
        assert_eq!(summary.per_player[0].position.total_buy_ins, dec(100));
        assert_eq!(summary.net, dec(-100));
    }

    #[tokio::test]
    async fn balanced_game_is_flagged() {
        let fx = Fixture::new().await;
        let anon = fx.add_anonymous(fx.league_id, "Uncle Joe").await;
        let game = fx
            .ledger
            .start(
                fx.admin,
                fx.league_id,
                Some(dec(20)),
                vec![PlayerIdentity::Anonymous(anon)],
            )
            .await
            .unwrap();
        let summary = fx.ledger.summarize(game.id).await.unwrap();
        assert_eq!(summary.per_player[0].display_name, "Uncle Joe");
        let gp = summary.per_player[0].game_player_id;

        fx.ledger
            .deactivate(fx.admin, game.id, gp, dec(20))
            .await
            .unwrap();
        let summary = fx.ledger.summarize(game.id).await.unwrap();
        assert!(summary.is_balanced);
        assert_eq!(summary.net, dec(0));
        assert_eq!(summary.active_players, 0);
    }

    #[tokio::test]
    async fn detail_read_heals_a_stale_snapshot() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(
                fx.admin,
                fx.league_id,
                None,
                vec![PlayerIdentity::Registered(fx.alice)],
            )
            .await
            .unwrap();
        let gp = fx.ledger.summarize(game.id).await.unwrap().per_player[0].game_player_id;
        fx.ledger
            .deactivate(fx.alice, game.id, gp, dec(70))
            .await
            .unwrap();

        // Simulate an interrupted write leaving a wrong cached profit.
        let mut tx = fx.store.begin().await.unwrap();
        let mut player = tx.get_game_player(gp).await.unwrap().unwrap();
        player.profit = Some(dec(999));
        tx.update_game_player(&player).await.unwrap();
        tx.commit().await.unwrap();

        fx.ledger.game_detail(fx.alice, game.id).await.unwrap();
        let mut tx = fx.store.begin().await.unwrap();
        let player = tx.get_game_player(gp).await.unwrap().unwrap();
        assert_eq!(player.profit, Some(dec(-30)));
        assert_eq!(player.final_amount, Some(dec(70)));
        drop(tx);

        assert_eq!(fx.ledger.repair_snapshots(game.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn settlement_requires_completion() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(fx.admin, fx.league_id, None, vec![])
            .await
            .unwrap();
        let err = fx
            .ledger
            .settled_detail(fx.alice, game.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::GameStillActive));

        fx.ledger.end(fx.admin, game.id).await.unwrap();
        let detail = fx.ledger.settled_detail(fx.alice, game.id).await.unwrap();
        assert_eq!(detail.summary.total_players, 0);
    }

    #[tokio::test]
    async fn outsiders_cannot_read_detail() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(fx.admin, fx.league_id, None, vec![])
            .await
            .unwrap();
        let err = fx
            .ledger
            .game_detail(Uuid::new_v4(), game.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));
    }
}
