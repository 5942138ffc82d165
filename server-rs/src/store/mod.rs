//! Typed repositories over the relational store.
//!
//! Every unit of work opens a [`StoreTxn`] through [`Store::begin`]. Dropping a
//! transaction without calling `commit` discards its writes, so a cancelled
//! request never leaves a half-applied ledger mutation behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ledger::LedgerResult;
use crate::models::{
    AnonymousPlayer, CashEntry, EntryType, Game, GamePlayer, League, LeagueMember, NewCashEntry,
    PlayerIdentity,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> LedgerResult<Box<dyn StoreTxn>>;

    async fn health_check(&self) -> bool;
}

#[async_trait]
pub trait LeagueRepo: Send {
    async fn insert_league(&mut self, league: &League) -> LedgerResult<()>;

    async fn get_league(&mut self, id: Uuid) -> LedgerResult<Option<League>>;

    async fn find_league_by_code(&mut self, invite_code: &str) -> LedgerResult<Option<League>>;

    async fn update_league(&mut self, league: &League) -> LedgerResult<()>;

    /// Leagues in which the user holds an active membership.
    async fn list_leagues_for_user(
        &mut self,
        user_id: Uuid,
    ) -> LedgerResult<Vec<(League, LeagueMember)>>;
}

#[async_trait]
pub trait MemberRepo: Send {
    async fn insert_member(&mut self, member: &LeagueMember) -> LedgerResult<()>;

    async fn find_member(
        &mut self,
        league_id: Uuid,
        user_id: Uuid,
    ) -> LedgerResult<Option<LeagueMember>>;

    async fn set_member_active(
        &mut self,
        league_id: Uuid,
        user_id: Uuid,
        is_active: bool,
    ) -> LedgerResult<()>;

    async fn list_members(&mut self, league_id: Uuid) -> LedgerResult<Vec<LeagueMember>>;

    async fn insert_anonymous_player(&mut self, player: &AnonymousPlayer) -> LedgerResult<()>;

    async fn get_anonymous_player(&mut self, id: Uuid) -> LedgerResult<Option<AnonymousPlayer>>;

    async fn list_anonymous_players(&mut self, league_id: Uuid)
        -> LedgerResult<Vec<AnonymousPlayer>>;
}

#[async_trait]
pub trait GameRepo: Send {
    /// Fails with `ActiveGameExists` when the league already has an active game.
    async fn insert_game(&mut self, game: &Game) -> LedgerResult<()>;

    async fn get_game(&mut self, id: Uuid) -> LedgerResult<Option<Game>>;

    /// Reads the game and holds a write lock on it until the transaction ends.
    async fn lock_game(&mut self, id: Uuid) -> LedgerResult<Option<Game>>;

    async fn active_game_for_league(&mut self, league_id: Uuid) -> LedgerResult<Option<Game>>;

    /// Most recent first.
    async fn list_games(&mut self, league_id: Uuid) -> LedgerResult<Vec<Game>>;

    /// Conditional transition `active -> completed`. Returns `None` when the
    /// game was not active at write time.
    async fn complete_game(
        &mut self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Game>>;
}

#[async_trait]
pub trait GamePlayerRepo: Send {
    async fn insert_game_player(&mut self, player: &GamePlayer) -> LedgerResult<()>;

    async fn get_game_player(&mut self, id: Uuid) -> LedgerResult<Option<GamePlayer>>;

    async fn find_game_player(
        &mut self,
        game_id: Uuid,
        identity: &PlayerIdentity,
    ) -> LedgerResult<Option<GamePlayer>>;

    /// Ordered by join time.
    async fn list_game_players(&mut self, game_id: Uuid) -> LedgerResult<Vec<GamePlayer>>;

    async fn update_game_player(&mut self, player: &GamePlayer) -> LedgerResult<()>;

    async fn count_active_players(&mut self, game_id: Uuid) -> LedgerResult<usize>;

    /// Every seat of every completed game in the league.
    async fn list_completed_league_players(
        &mut self,
        league_id: Uuid,
    ) -> LedgerResult<Vec<GamePlayer>>;
}

#[async_trait]
pub trait CashEntryRepo: Send {
    async fn insert_cash_entry(&mut self, entry: NewCashEntry) -> LedgerResult<CashEntry>;

    /// Chronological.
    async fn list_cash_entries(&mut self, game_player_id: Uuid) -> LedgerResult<Vec<CashEntry>>;

    /// Chronological, every player of the game.
    async fn list_game_entries(&mut self, game_id: Uuid) -> LedgerResult<Vec<CashEntry>>;

    async fn latest_cash_entry(
        &mut self,
        game_player_id: Uuid,
        entry_type: EntryType,
    ) -> LedgerResult<Option<CashEntry>>;

    async fn delete_cash_entry(&mut self, id: Uuid) -> LedgerResult<()>;

    async fn delete_player_entries(&mut self, game_player_id: Uuid) -> LedgerResult<u64>;

    /// Every entry of every completed game in the league.
    async fn list_completed_league_entries(
        &mut self,
        league_id: Uuid,
    ) -> LedgerResult<Vec<CashEntry>>;
}

#[async_trait]
pub trait StoreTxn:
    LeagueRepo + MemberRepo + GameRepo + GamePlayerRepo + CashEntryRepo + Send
{
    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
