use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::ledger::{LedgerError, LedgerResult};
use crate::models::{
    AnonymousPlayer, CashEntry, EntryType, Game, GamePlayer, GameStatus, League, LeagueMember,
    NewCashEntry, PlayerIdentity,
};

use super::{CashEntryRepo, GamePlayerRepo, GameRepo, LeagueRepo, MemberRepo, Store, StoreTxn};

#[derive(Clone, Default)]
struct Tables {
    leagues: HashMap<Uuid, League>,
    members: HashMap<(Uuid, Uuid), LeagueMember>,
    anonymous_players: HashMap<Uuid, AnonymousPlayer>,
    games: HashMap<Uuid, Game>,
    game_players: HashMap<Uuid, GamePlayer>,
    // insertion order doubles as the `seq` tie-breaker
    cash_entries: Vec<CashEntry>,
    next_seq: i64,
}

/// Process-local store used by tests and `STORE_BACKEND=memory`.
///
/// A transaction owns the table lock for its whole lifetime and mutates a
/// working copy; `commit` swaps the copy in. Transactions are therefore fully
/// serialized.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTxn {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> LedgerResult<Box<dyn StoreTxn>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTxn { guard, work }))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[async_trait]
impl StoreTxn for MemoryTxn {
    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryTxn { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

fn sort_chronologically(entries: &mut [CashEntry]) {
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
}

#[async_trait]
impl LeagueRepo for MemoryTxn {
    async fn insert_league(&mut self, league: &League) -> LedgerResult<()> {
        if self
            .work
            .leagues
            .values()
            .any(|l| l.invite_code == league.invite_code)
        {
            return Err(LedgerError::Internal("duplicate invite code".into()));
        }
        self.work.leagues.insert(league.id, league.clone());
        Ok(())
    }

    async fn get_league(&mut self, id: Uuid) -> LedgerResult<Option<League>> {
        Ok(self.work.leagues.get(&id).cloned())
    }

    async fn find_league_by_code(&mut self, invite_code: &str) -> LedgerResult<Option<League>> {
        Ok(self
            .work
            .leagues
            .values()
            .find(|l| l.invite_code == invite_code)
            .cloned())
    }

    async fn update_league(&mut self, league: &League) -> LedgerResult<()> {
        match self.work.leagues.get_mut(&league.id) {
            Some(existing) => {
                *existing = league.clone();
                Ok(())
            }
            None => Err(LedgerError::NotFound("League")),
        }
    }

    async fn list_leagues_for_user(
        &mut self,
        user_id: Uuid,
    ) -> LedgerResult<Vec<(League, LeagueMember)>> {
        let mut rows: Vec<(League, LeagueMember)> = self
            .work
            .members
            .values()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter_map(|m| {
                self.work
                    .leagues
                    .get(&m.league_id)
                    .map(|l| (l.clone(), m.clone()))
            })
            .collect();
        rows.sort_by(|a, b| a.1.joined_at.cmp(&b.1.joined_at));
        Ok(rows)
    }
}

#[async_trait]
impl MemberRepo for MemoryTxn {
    async fn insert_member(&mut self, member: &LeagueMember) -> LedgerResult<()> {
        let key = (member.league_id, member.user_id);
        if self.work.members.contains_key(&key) {
            return Err(LedgerError::AlreadyActive);
        }
        self.work.members.insert(key, member.clone());
        Ok(())
    }

    async fn find_member(
        &mut self,
        league_id: Uuid,
        user_id: Uuid,
    ) -> LedgerResult<Option<LeagueMember>> {
        Ok(self.work.members.get(&(league_id, user_id)).cloned())
    }

    async fn set_member_active(
        &mut self,
        league_id: Uuid,
        user_id: Uuid,
        is_active: bool,
    ) -> LedgerResult<()> {
        match self.work.members.get_mut(&(league_id, user_id)) {
            Some(member) => {
                member.is_active = is_active;
                Ok(())
            }
            None => Err(LedgerError::NotFound("Member")),
        }
    }

    async fn list_members(&mut self, league_id: Uuid) -> LedgerResult<Vec<LeagueMember>> {
        let mut members: Vec<LeagueMember> = self
            .work
            .members
            .values()
            .filter(|m| m.league_id == league_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    async fn insert_anonymous_player(&mut self, player: &AnonymousPlayer) -> LedgerResult<()> {
        self.work
            .anonymous_players
            .insert(player.id, player.clone());
        Ok(())
    }

    async fn get_anonymous_player(&mut self, id: Uuid) -> LedgerResult<Option<AnonymousPlayer>> {
        Ok(self.work.anonymous_players.get(&id).cloned())
    }

    async fn list_anonymous_players(
        &mut self,
        league_id: Uuid,
    ) -> LedgerResult<Vec<AnonymousPlayer>> {
        let mut players: Vec<AnonymousPlayer> = self
            .work
            .anonymous_players
            .values()
            .filter(|p| p.league_id == league_id)
            .cloned()
            .collect();
        players.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(players)
    }
}

#[async_trait]
impl GameRepo for MemoryTxn {
    async fn insert_game(&mut self, game: &Game) -> LedgerResult<()> {
        let clash = self
            .work
            .games
            .values()
            .any(|g| g.league_id == game.league_id && g.is_active());
        if game.is_active() && clash {
            return Err(LedgerError::ActiveGameExists);
        }
        self.work.games.insert(game.id, game.clone());
        Ok(())
    }

    async fn get_game(&mut self, id: Uuid) -> LedgerResult<Option<Game>> {
        Ok(self.work.games.get(&id).cloned())
    }

    async fn lock_game(&mut self, id: Uuid) -> LedgerResult<Option<Game>> {
        // the transaction already holds the table lock
        Ok(self.work.games.get(&id).cloned())
    }

    async fn active_game_for_league(&mut self, league_id: Uuid) -> LedgerResult<Option<Game>> {
        Ok(self
            .work
            .games
            .values()
            .find(|g| g.league_id == league_id && g.is_active())
            .cloned())
    }

    async fn list_games(&mut self, league_id: Uuid) -> LedgerResult<Vec<Game>> {
        let mut games: Vec<Game> = self
            .work
            .games
            .values()
            .filter(|g| g.league_id == league_id)
            .cloned()
            .collect();
        games.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(games)
    }

    async fn complete_game(
        &mut self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Game>> {
        match self.work.games.get_mut(&id) {
            Some(game) if game.is_active() => {
                game.status = GameStatus::Completed;
                game.ended_at = Some(ended_at);
                Ok(Some(game.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl GamePlayerRepo for MemoryTxn {
    async fn insert_game_player(&mut self, player: &GamePlayer) -> LedgerResult<()> {
        let duplicate = self
            .work
            .game_players
            .values()
            .any(|p| p.game_id == player.game_id && p.identity == player.identity);
        if duplicate {
            return Err(LedgerError::AlreadyActive);
        }
        self.work.game_players.insert(player.id, player.clone());
        Ok(())
    }

    async fn get_game_player(&mut self, id: Uuid) -> LedgerResult<Option<GamePlayer>> {
        Ok(self.work.game_players.get(&id).cloned())
    }

    async fn find_game_player(
        &mut self,
        game_id: Uuid,
        identity: &PlayerIdentity,
    ) -> LedgerResult<Option<GamePlayer>> {
        Ok(self
            .work
            .game_players
            .values()
            .find(|p| p.game_id == game_id && &p.identity == identity)
            .cloned())
    }

    async fn list_game_players(&mut self, game_id: Uuid) -> LedgerResult<Vec<GamePlayer>> {
        let mut players: Vec<GamePlayer> = self
            .work
            .game_players
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        players.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(players)
    }

    async fn update_game_player(&mut self, player: &GamePlayer) -> LedgerResult<()> {
        match self.work.game_players.get_mut(&player.id) {
            Some(existing) => {
                *existing = player.clone();
                Ok(())
            }
            None => Err(LedgerError::PlayerNotInGame),
        }
    }

    async fn count_active_players(&mut self, game_id: Uuid) -> LedgerResult<usize> {
        Ok(self
            .work
            .game_players
            .values()
            .filter(|p| p.game_id == game_id && p.is_active)
            .count())
    }

    async fn list_completed_league_players(
        &mut self,
        league_id: Uuid,
    ) -> LedgerResult<Vec<GamePlayer>> {
        let games = &self.work.games;
        let mut players: Vec<GamePlayer> = self
            .work
            .game_players
            .values()
            .filter(|p| {
                games
                    .get(&p.game_id)
                    .map(|g| g.league_id == league_id && !g.is_active())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        players.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(players)
    }
}

#[async_trait]
impl CashEntryRepo for MemoryTxn {
    async fn insert_cash_entry(&mut self, entry: NewCashEntry) -> LedgerResult<CashEntry> {
        self.work.next_seq += 1;
        let row = CashEntry {
            id: Uuid::new_v4(),
            game_id: entry.game_id,
            game_player_id: entry.game_player_id,
            identity: entry.identity,
            amount: entry.amount,
            entry_type: entry.entry_type,
            notes: entry.notes,
            chip_count: entry.chip_count,
            created_at: entry.created_at,
            seq: self.work.next_seq,
        };
        self.work.cash_entries.push(row.clone());
        Ok(row)
    }

    async fn list_cash_entries(&mut self, game_player_id: Uuid) -> LedgerResult<Vec<CashEntry>> {
        let mut entries: Vec<CashEntry> = self
            .work
            .cash_entries
            .iter()
            .filter(|e| e.game_player_id == game_player_id)
            .cloned()
            .collect();
        sort_chronologically(&mut entries);
        Ok(entries)
    }

    async fn list_game_entries(&mut self, game_id: Uuid) -> LedgerResult<Vec<CashEntry>> {
        let mut entries: Vec<CashEntry> = self
            .work
            .cash_entries
            .iter()
            .filter(|e| e.game_id == game_id)
            .cloned()
            .collect();
        sort_chronologically(&mut entries);
        Ok(entries)
    }

    async fn latest_cash_entry(
        &mut self,
        game_player_id: Uuid,
        entry_type: EntryType,
    ) -> LedgerResult<Option<CashEntry>> {
        Ok(self
            .work
            .cash_entries
            .iter()
            .filter(|e| e.game_player_id == game_player_id && e.entry_type == entry_type)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)))
            .cloned())
    }

    async fn delete_cash_entry(&mut self, id: Uuid) -> LedgerResult<()> {
        self.work.cash_entries.retain(|e| e.id != id);
        Ok(())
    }

    async fn delete_player_entries(&mut self, game_player_id: Uuid) -> LedgerResult<u64> {
        let before = self.work.cash_entries.len();
        self.work
            .cash_entries
            .retain(|e| e.game_player_id != game_player_id);
        Ok((before - self.work.cash_entries.len()) as u64)
    }

    async fn list_completed_league_entries(
        &mut self,
        league_id: Uuid,
    ) -> LedgerResult<Vec<CashEntry>> {
        let games = &self.work.games;
        let mut entries: Vec<CashEntry> = self
            .work
            .cash_entries
            .iter()
            .filter(|e| {
                games
                    .get(&e.game_id)
                    .map(|g| g.league_id == league_id && !g.is_active())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        sort_chronologically(&mut entries);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn game(league_id: Uuid) -> Game {
        Game {
            id: Uuid::new_v4(),
            league_id,
            status: GameStatus::Active,
            created_by: Uuid::new_v4(),
            buy_in: Decimal::from(100),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let g = game(Uuid::new_v4());
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_game(&g).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_game(g.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let g = game(Uuid::new_v4());
        let mut tx = store.begin().await.unwrap();
        tx.insert_game(&g).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get_game(g.id).await.unwrap(), Some(g));
    }

    #[tokio::test]
    async fn second_active_game_in_league_is_rejected() {
        let store = MemoryStore::new();
        let league_id = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        tx.insert_game(&game(league_id)).await.unwrap();
        let err = tx.insert_game(&game(league_id)).await.unwrap_err();
        assert!(matches!(err, LedgerError::ActiveGameExists));
    }

    #[tokio::test]
    async fn latest_entry_breaks_timestamp_ties_by_insertion() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let gp = Uuid::new_v4();
        let at = Utc::now();
        let mut ids = Vec::new();
        for amount in [10, 20] {
            let row = tx
                .insert_cash_entry(NewCashEntry {
                    game_id: Uuid::new_v4(),
                    game_player_id: gp,
                    identity: PlayerIdentity::Registered(Uuid::new_v4()),
                    amount: Decimal::from(amount),
                    entry_type: EntryType::BuyIn,
                    notes: None,
                    chip_count: None,
                    created_at: at,
                })
                .await
                .unwrap();
            ids.push(row.id);
        }
        let latest = tx
            .latest_cash_entry(gp, EntryType::BuyIn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, ids[1]);
    }
}
