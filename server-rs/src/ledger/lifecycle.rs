use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{EntryType, Game, GamePlayer, GameStatus, NewCashEntry, PlayerIdentity};
use crate::store::{CashEntryRepo, GamePlayerRepo, GameRepo, LeagueRepo};

use super::entries::check_bounds;
use super::{
    check_identity, checked_total, lock_game, require_member, Ledger, LedgerError, LedgerResult,
};

impl Ledger {
    /// Opens a game in `active` state, seats the listed players and books
    /// their initial buy-in.
    pub async fn start(
        &self,
        actor: Uuid,
        league_id: Uuid,
        buy_in: Option<Decimal>,
        players: Vec<PlayerIdentity>,
    ) -> LedgerResult<Game> {
        let mut seen = HashSet::new();
        if !players.iter().all(|p| seen.insert(*p)) {
            return Err(LedgerError::validation("Roster contains duplicate players"));
        }

        let mut tx = self.store.begin().await?;
        let league = tx
            .get_league(league_id)
            .await?
            .ok_or(LedgerError::NotFound("League"))?;
        require_member(tx.as_mut(), league_id, actor).await?;

        let buy_in = buy_in.unwrap_or(league.buy_in);
        check_bounds(buy_in, "Buy-in")?;

        for identity in &players {
            match check_identity(tx.as_mut(), league_id, identity).await {
                Ok(()) => {}
                Err(LedgerError::NotLeagueMember) => {
                    return Err(LedgerError::RosterInvalid(format!(
                        "{identity:?} is not an active member of this league"
                    )))
                }
                Err(LedgerError::NotFound(_)) => {
                    return Err(LedgerError::RosterInvalid(format!(
                        "{identity:?} does not belong to this league"
                    )))
                }
                Err(e) => return Err(e),
            }
        }

        let now = Utc::now();
        let game = Game {
            id: Uuid::new_v4(),
            league_id,
            status: GameStatus::Active,
            created_by: actor,
            buy_in,
            started_at: now,
            ended_at: None,
        };
        tx.insert_game(&game).await?;

        for identity in players.iter().copied() {
            let player = GamePlayer::new(game.id, identity, now);
            tx.insert_game_player(&player).await?;
            if buy_in > Decimal::ZERO {
                tx.insert_cash_entry(NewCashEntry {
                    game_id: game.id,
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
        }
        tx.commit().await?;

        tracing::info!(
            game_id = %game.id,
            %league_id,
            created_by = %actor,
            %buy_in,
            players = players.len(),
            "game started"
        );
        Ok(game)
    }

    /// Closes the game. Every seat must have been cashed out first.
    pub async fn end(&self, actor: Uuid, game_id: Uuid) -> LedgerResult<Game> {
        let mut tx = self.store.begin().await?;
        let game = lock_game(tx.as_mut(), game_id).await?;
        if !game.is_active() {
            return Err(LedgerError::GameNotActive);
        }
        if game.created_by != actor {
            return Err(LedgerError::forbidden("Only the game creator can end the game"));
        }

        let count = tx.count_active_players(game_id).await?;
        if count > 0 {
            return Err(LedgerError::PlayersStillActive { count });
        }

        let game = tx
            .complete_game(game_id, Utc::now())
            .await?
            .ok_or(LedgerError::GameNotActive)?;
        let entries = tx.list_game_entries(game_id).await?;
        tx.commit().await?;

        let total_of = |entry_type: EntryType| {
            checked_total(
                entries
                    .iter()
                    .filter(|e| e.entry_type == entry_type)
                    .map(|e| e.amount),
            )
        };
        // the game is already committed; totals only feed the warning
        if let (Ok(buy_ins), Ok(buy_outs)) = (total_of(EntryType::BuyIn), total_of(EntryType::BuyOut))
        {
            if buy_ins == buy_outs {
                tracing::info!(%game_id, ended_by = %actor, "game completed");
                return Ok(game);
            }
            tracing::warn!(
                %game_id,
                total_buy_ins = %buy_ins,
                total_buy_outs = %buy_outs,
                "game closed unbalanced"
            );
        }
        tracing::info!(%game_id, ended_by = %actor, "game completed");
        Ok(game)
    }

    pub async fn active_game_for_league(
        &self,
        actor: Uuid,
        league_id: Uuid,
    ) -> LedgerResult<Option<Game>> {
        let mut tx = self.store.begin().await?;
        require_member(tx.as_mut(), league_id, actor).await?;
        tx.active_game_for_league(league_id).await
    }

    /// Most recent first.
    pub async fn list_games(&self, actor: Uuid, league_id: Uuid) -> LedgerResult<Vec<Game>> {
        let mut tx = self.store.begin().await?;
        require_member(tx.as_mut(), league_id, actor).await?;
        tx.list_games(league_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::{dec, Fixture};

    fn roster(users: &[Uuid]) -> Vec<PlayerIdentity> {
        users.iter().map(|u| PlayerIdentity::Registered(*u)).collect()
    }

    #[tokio::test]
    async fn start_books_default_buy_in_per_player() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(fx.admin, fx.league_id, None, roster(&[fx.alice, fx.bob]))
            .await
            .unwrap();
        assert_eq!(game.status, GameStatus::Active);
        assert_eq!(game.buy_in, dec(100));

        let summary = fx.ledger.summarize(game.id).await.unwrap();
        assert_eq!(summary.total_buy_ins, dec(200));
        assert_eq!(summary.active_players, 2);
        assert_eq!(summary.total_players, 2);
    }

    #[tokio::test]
    async fn zero_buy_in_seats_players_without_entries() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(fx.admin, fx.league_id, Some(dec(0)), roster(&[fx.alice]))
            .await
            .unwrap();
        let summary = fx.ledger.summarize(game.id).await.unwrap();
        assert_eq!(summary.total_buy_ins, dec(0));
        assert_eq!(summary.active_players, 1);
    }

    #[tokio::test]
    async fn start_rejects_outsiders_on_the_roster() {
        let fx = Fixture::new().await;
        let err = fx
            .ledger
            .start(fx.admin, fx.league_id, None, roster(&[fx.alice, Uuid::new_v4()]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RosterInvalid(_)));

        let foreign = fx.add_anonymous(Uuid::new_v4(), "Drifter").await;
        let err = fx
            .ledger
            .start(
                fx.admin,
                fx.league_id,
                None,
                vec![PlayerIdentity::Anonymous(foreign)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RosterInvalid(_)));

        assert!(fx
            .ledger
            .active_game_for_league(fx.admin, fx.league_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn start_rejects_duplicates_and_negative_buy_in() {
        let fx = Fixture::new().await;
        let err = fx
            .ledger
            .start(fx.admin, fx.league_id, None, roster(&[fx.alice, fx.alice]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = fx
            .ledger
            .start(fx.admin, fx.league_id, Some(dec(-5)), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn start_rejects_fractional_cents_and_oversized_buy_ins() {
        let fx = Fixture::new().await;
        for buy_in in [Decimal::new(1, 3), Decimal::MAX] {
            let err = fx
                .ledger
                .start(fx.admin, fx.league_id, Some(buy_in), roster(&[fx.alice, fx.bob]))
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }
        assert!(fx
            .ledger
            .active_game_for_league(fx.admin, fx.league_id)
            .await
            .unwrap()
            .is_none());

        // the largest accepted buy-in still sums cleanly across the table
        let game = fx
            .ledger
            .start(
                fx.admin,
                fx.league_id,
                Some(crate::ledger::entries::max_amount()),
                roster(&[fx.alice, fx.bob]),
            )
            .await
            .unwrap();
        let summary = fx.ledger.summarize(game.id).await.unwrap();
        assert_eq!(
            summary.total_buy_ins,
            crate::ledger::entries::max_amount() * Decimal::from(2)
        );
    }

    #[tokio::test]
    async fn only_one_active_game_per_league() {
        let fx = Fixture::new().await;
        fx.ledger
            .start(fx.admin, fx.league_id, None, vec![])
            .await
            .unwrap();
        let err = fx
            .ledger
            .start(fx.alice, fx.league_id, None, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ActiveGameExists));
    }

    #[tokio::test]
    async fn full_game_closes_once_everyone_cashed_out() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(fx.admin, fx.league_id, None, roster(&[fx.alice, fx.bob]))
            .await
            .unwrap();
        let summary = fx.ledger.summarize(game.id).await.unwrap();
        let gp = |user| {
            summary
                .per_player
                .iter()
                .find(|p| p.identity == PlayerIdentity::Registered(user))
                .unwrap()
                .game_player_id
        };
        let (a, b) = (gp(fx.alice), gp(fx.bob));

        fx.ledger
            .deactivate(fx.alice, game.id, a, dec(80))
            .await
            .unwrap();
        let err = fx.ledger.end(fx.admin, game.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::PlayersStillActive { count: 1 }));

        let player = fx
            .ledger
            .deactivate(fx.bob, game.id, b, dec(150))
            .await
            .unwrap();
        assert_eq!(player.profit, Some(dec(50)));

        let ended = fx.ledger.end(fx.admin, game.id).await.unwrap();
        assert_eq!(ended.status, GameStatus::Completed);
        assert!(ended.ended_at.is_some());

        let summary = fx.ledger.summarize(game.id).await.unwrap();
        assert_eq!(summary.total_buy_ins, dec(200));
        assert_eq!(summary.total_buy_outs, dec(230));
        assert!(!summary.is_balanced);
    }

    #[tokio::test]
    async fn end_checks_run_in_order() {
        let fx = Fixture::new().await;
        let err = fx.ledger.end(fx.admin, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let game = fx
            .ledger
            .start(fx.admin, fx.league_id, None, roster(&[fx.alice]))
            .await
            .unwrap();
        let err = fx.ledger.end(fx.alice, game.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));
        let err = fx.ledger.end(fx.admin, game.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::PlayersStillActive { count: 1 }));
    }

    #[tokio::test]
    async fn completed_game_is_frozen() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(fx.admin, fx.league_id, None, roster(&[fx.alice]))
            .await
            .unwrap();
        let gp = fx.ledger.summarize(game.id).await.unwrap().per_player[0].game_player_id;
        fx.ledger
            .deactivate(fx.alice, game.id, gp, dec(100))
            .await
            .unwrap();
        fx.ledger.end(fx.admin, game.id).await.unwrap();

        let err = fx.ledger.end(fx.admin, game.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::GameNotActive));
        let err = fx
            .ledger
            .record(fx.alice, game.id, gp, EntryType::BuyOut, dec(5), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::GameNotActive));
        let err = fx
            .ledger
            .undo_last(fx.alice, game.id, gp, EntryType::BuyOut)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::GameNotActive));
        let err = fx
            .ledger
            .reactivate(fx.alice, game.id, gp)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::GameNotActive));

        // The league is free for a new game once the previous one closed.
        let next = fx
            .ledger
            .start(fx.admin, fx.league_id, None, vec![])
            .await
            .unwrap();
        let games = fx.ledger.list_games(fx.bob, fx.league_id).await.unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].id, next.id);
    }

    #[tokio::test]
    async fn concurrent_end_succeeds_once() {
        let fx = Fixture::new().await;
        let game = fx
            .ledger
            .start(fx.admin, fx.league_id, None, vec![])
            .await
            .unwrap();
        let (a, b) = tokio::join!(
            fx.ledger.end(fx.admin, game.id),
            fx.ledger.end(fx.admin, game.id),
        );
        assert!(a.is_ok() ^ b.is_ok());
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, LedgerError::GameNotActive));
    }
}
