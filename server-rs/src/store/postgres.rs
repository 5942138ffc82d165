use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::ledger::{LedgerError, LedgerResult};
use crate::models::{
    AnonymousPlayer, CashEntry, EntryType, Game, GamePlayer, GameStatus, League, LeagueMember,
    MemberRole, NewCashEntry, PlayerIdentity,
};

use super::{CashEntryRepo, GamePlayerRepo, GameRepo, LeagueRepo, MemberRepo, Store, StoreTxn};

const ONE_ACTIVE_GAME_INDEX: &str = "games_one_active_per_league";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgTxn {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> LedgerResult<Box<dyn StoreTxn>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTxn { tx }))
    }

    async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[async_trait]
impl StoreTxn for PgTxn {
    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn corrupt(what: &str, value: &str) -> LedgerError {
    LedgerError::Internal(format!("unexpected {what} in storage: {value}"))
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    league_id: Uuid,
    user_id: Uuid,
    display_name: String,
    role: String,
    is_active: bool,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for LeagueMember {
    type Error = LedgerError;

    fn try_from(row: MemberRow) -> LedgerResult<Self> {
        let role = MemberRole::parse(&row.role).ok_or_else(|| corrupt("role", &row.role))?;
        Ok(LeagueMember {
            league_id: row.league_id,
            user_id: row.user_id,
            display_name: row.display_name,
            role,
            is_active: row.is_active,
            joined_at: row.joined_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GameRow {
    id: Uuid,
    league_id: Uuid,
    status: String,
    created_by: Uuid,
    buy_in: Decimal,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<GameRow> for Game {
    type Error = LedgerError;

    fn try_from(row: GameRow) -> LedgerResult<Self> {
        let status = GameStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?;
        Ok(Game {
            id: row.id,
            league_id: row.league_id,
            status,
            created_by: row.created_by,
            buy_in: row.buy_in,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GamePlayerRow {
    id: Uuid,
    game_id: Uuid,
    user_id: Option<Uuid>,
    anonymous_player_id: Option<Uuid>,
    is_active: bool,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
    final_amount: Option<Decimal>,
    profit: Option<Decimal>,
}

impl TryFrom<GamePlayerRow> for GamePlayer {
    type Error = LedgerError;

    fn try_from(row: GamePlayerRow) -> LedgerResult<Self> {
        let identity = PlayerIdentity::from_columns(row.user_id, row.anonymous_player_id)
            .ok_or_else(|| corrupt("identity", &row.id.to_string()))?;
        Ok(GamePlayer {
            id: row.id,
            game_id: row.game_id,
            identity,
            is_active: row.is_active,
            joined_at: row.joined_at,
            left_at: row.left_at,
            final_amount: row.final_amount,
            profit: row.profit,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CashEntryRow {
    id: Uuid,
    seq: i64,
    game_id: Uuid,
    game_player_id: Uuid,
    user_id: Option<Uuid>,
    anonymous_player_id: Option<Uuid>,
    amount: Decimal,
    entry_type: String,
    notes: Option<String>,
    chip_count: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CashEntryRow> for CashEntry {
    type Error = LedgerError;

    fn try_from(row: CashEntryRow) -> LedgerResult<Self> {
        let identity = PlayerIdentity::from_columns(row.user_id, row.anonymous_player_id)
            .ok_or_else(|| corrupt("identity", &row.id.to_string()))?;
        let entry_type = EntryType::parse(&row.entry_type)
            .ok_or_else(|| corrupt("entry type", &row.entry_type))?;
        Ok(CashEntry {
            id: row.id,
            game_id: row.game_id,
            game_player_id: row.game_player_id,
            identity,
            amount: row.amount,
            entry_type,
            notes: row.notes,
            chip_count: row.chip_count,
            created_at: row.created_at,
            seq: row.seq,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> LedgerResult<Vec<T>>
where
    T: TryFrom<R, Error = LedgerError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const GAME_COLUMNS: &str = "id, league_id, status, created_by, buy_in, started_at, ended_at";
const GAME_PLAYER_COLUMNS: &str = "id, game_id, user_id, anonymous_player_id, is_active, joined_at, left_at, final_amount, profit";
const CASH_ENTRY_COLUMNS: &str = "id, seq, game_id, game_player_id, user_id, anonymous_player_id, amount, entry_type, notes, chip_count, created_at";

#[async_trait]
impl LeagueRepo for PgTxn {
    async fn insert_league(&mut self, league: &League) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO leagues (id, name, invite_code, buy_in, image_url, admin_id, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(league.id)
        .bind(&league.name)
        .bind(&league.invite_code)
        .bind(league.buy_in)
        .bind(&league.image_url)
        .bind(league.admin_id)
        .bind(league.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_league(&mut self, id: Uuid) -> LedgerResult<Option<League>> {
        let league = sqlx::query_as::<_, League>("SELECT * FROM leagues WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(league)
    }

    async fn find_league_by_code(&mut self, invite_code: &str) -> LedgerResult<Option<League>> {
        let league = sqlx::query_as::<_, League>("SELECT * FROM leagues WHERE invite_code = $1")
            .bind(invite_code)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(league)
    }

    async fn update_league(&mut self, league: &League) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE leagues SET name = $2, invite_code = $3, buy_in = $4, image_url = $5 WHERE id = $1",
        )
        .bind(league.id)
        .bind(&league.name)
        .bind(&league.invite_code)
        .bind(league.buy_in)
        .bind(&league.image_url)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound("League"));
        }
        Ok(())
    }

    async fn list_leagues_for_user(
        &mut self,
        user_id: Uuid,
    ) -> LedgerResult<Vec<(League, LeagueMember)>> {
        let rows: Vec<(
            Uuid,
            String,
            String,
            Decimal,
            Option<String>,
            Uuid,
            DateTime<Utc>,
            String,
            String,
            bool,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"SELECT l.id, l.name, l.invite_code, l.buy_in, l.image_url, l.admin_id, l.created_at,
                m.display_name, m.role, m.is_active, m.joined_at
            FROM leagues l
            JOIN league_members m ON m.league_id = l.id
            WHERE m.user_id = $1 AND m.is_active
            ORDER BY m.joined_at"#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(
                |(id, name, invite_code, buy_in, image_url, admin_id, created_at, display_name, role, is_active, joined_at)| {
                    let member = LeagueMember::try_from(MemberRow {
                        league_id: id,
                        user_id,
                        display_name,
                        role,
                        is_active,
                        joined_at,
                    })?;
                    let league = League {
                        id,
                        name,
                        invite_code,
                        buy_in,
                        image_url,
                        admin_id,
                        created_at,
                    };
                    Ok((league, member))
                },
            )
            .collect()
    }
}

#[async_trait]
impl MemberRepo for PgTxn {
    async fn insert_member(&mut self, member: &LeagueMember) -> LedgerResult<()> {
        let result = sqlx::query(
            "INSERT INTO league_members (league_id, user_id, display_name, role, is_active, joined_at) VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT DO NOTHING",
        )
        .bind(member.league_id)
        .bind(member.user_id)
        .bind(&member.display_name)
        .bind(member.role.as_str())
        .bind(member.is_active)
        .bind(member.joined_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyActive);
        }
        Ok(())
    }

    async fn find_member(
        &mut self,
        league_id: Uuid,
        user_id: Uuid,
    ) -> LedgerResult<Option<LeagueMember>> {
        let row = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM league_members WHERE league_id = $1 AND user_id = $2",
        )
        .bind(league_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(LeagueMember::try_from).transpose()
    }

    async fn set_member_active(
        &mut self,
        league_id: Uuid,
        user_id: Uuid,
        is_active: bool,
    ) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE league_members SET is_active = $3 WHERE league_id = $1 AND user_id = $2",
        )
        .bind(league_id)
        .bind(user_id)
        .bind(is_active)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound("Member"));
        }
        Ok(())
    }

    async fn list_members(&mut self, league_id: Uuid) -> LedgerResult<Vec<LeagueMember>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM league_members WHERE league_id = $1 ORDER BY joined_at",
        )
        .bind(league_id)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn insert_anonymous_player(&mut self, player: &AnonymousPlayer) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO anonymous_players (id, league_id, name, created_by, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(player.id)
        .bind(player.league_id)
        .bind(&player.name)
        .bind(player.created_by)
        .bind(player.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_anonymous_player(&mut self, id: Uuid) -> LedgerResult<Option<AnonymousPlayer>> {
        let player =
            sqlx::query_as::<_, AnonymousPlayer>("SELECT * FROM anonymous_players WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(player)
    }

    async fn list_anonymous_players(
        &mut self,
        league_id: Uuid,
    ) -> LedgerResult<Vec<AnonymousPlayer>> {
        let players = sqlx::query_as::<_, AnonymousPlayer>(
            "SELECT * FROM anonymous_players WHERE league_id = $1 ORDER BY created_at",
        )
        .bind(league_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(players)
    }
}

#[async_trait]
impl GameRepo for PgTxn {
    async fn insert_game(&mut self, game: &Game) -> LedgerResult<()> {
        let result = sqlx::query(
            "INSERT INTO games (id, league_id, status, created_by, buy_in, started_at, ended_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(game.id)
        .bind(game.league_id)
        .bind(game.status.as_str())
        .bind(game.created_by)
        .bind(game.buy_in)
        .bind(game.started_at)
        .bind(game.ended_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db))
                if db.is_unique_violation() && db.constraint() == Some(ONE_ACTIVE_GAME_INDEX) =>
            {
                Err(LedgerError::ActiveGameExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_game(&mut self, id: Uuid) -> LedgerResult<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Game::try_from).transpose()
    }

    async fn lock_game(&mut self, id: Uuid) -> LedgerResult<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Game::try_from).transpose()
    }

    async fn active_game_for_league(&mut self, league_id: Uuid) -> LedgerResult<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE league_id = $1 AND status = 'active'"
        ))
        .bind(league_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Game::try_from).transpose()
    }

    async fn list_games(&mut self, league_id: Uuid) -> LedgerResult<Vec<Game>> {
        let rows = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE league_id = $1 ORDER BY started_at DESC"
        ))
        .bind(league_id)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn complete_game(
        &mut self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> LedgerResult<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "UPDATE games SET status = 'completed', ended_at = $2 WHERE id = $1 AND status = 'active' RETURNING {GAME_COLUMNS}"
        ))
        .bind(id)
        .bind(ended_at)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Game::try_from).transpose()
    }
}

#[async_trait]
impl GamePlayerRepo for PgTxn {
    async fn insert_game_player(&mut self, player: &GamePlayer) -> LedgerResult<()> {
        let result = sqlx::query(
            "INSERT INTO game_players (id, game_id, user_id, anonymous_player_id, is_active, joined_at, left_at, final_amount, profit) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(player.id)
        .bind(player.game_id)
        .bind(player.identity.user_id())
        .bind(player.identity.anonymous_id())
        .bind(player.is_active)
        .bind(player.joined_at)
        .bind(player.left_at)
        .bind(player.final_amount)
        .bind(player.profit)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(LedgerError::AlreadyActive)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_game_player(&mut self, id: Uuid) -> LedgerResult<Option<GamePlayer>> {
        let row = sqlx::query_as::<_, GamePlayerRow>(&format!(
            "SELECT {GAME_PLAYER_COLUMNS} FROM game_players WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(GamePlayer::try_from).transpose()
    }

    async fn find_game_player(
        &mut self,
        game_id: Uuid,
        identity: &PlayerIdentity,
    ) -> LedgerResult<Option<GamePlayer>> {
        let row = sqlx::query_as::<_, GamePlayerRow>(&format!(
            "SELECT {GAME_PLAYER_COLUMNS} FROM game_players WHERE game_id = $1 AND user_id IS NOT DISTINCT FROM $2 AND anonymous_player_id IS NOT DISTINCT FROM $3"
        ))
        .bind(game_id)
        .bind(identity.user_id())
        .bind(identity.anonymous_id())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(GamePlayer::try_from).transpose()
    }

    async fn list_game_players(&mut self, game_id: Uuid) -> LedgerResult<Vec<GamePlayer>> {
        let rows = sqlx::query_as::<_, GamePlayerRow>(&format!(
            "SELECT {GAME_PLAYER_COLUMNS} FROM game_players WHERE game_id = $1 ORDER BY joined_at, id"
        ))
        .bind(game_id)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn update_game_player(&mut self, player: &GamePlayer) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE game_players SET is_active = $2, left_at = $3, final_amount = $4, profit = $5 WHERE id = $1",
        )
        .bind(player.id)
        .bind(player.is_active)
        .bind(player.left_at)
        .bind(player.final_amount)
        .bind(player.profit)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::PlayerNotInGame);
        }
        Ok(())
    }

    async fn count_active_players(&mut self, game_id: Uuid) -> LedgerResult<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM game_players WHERE game_id = $1 AND is_active",
        )
        .bind(game_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count as usize)
    }

    async fn list_completed_league_players(
        &mut self,
        league_id: Uuid,
    ) -> LedgerResult<Vec<GamePlayer>> {
        let rows = sqlx::query_as::<_, GamePlayerRow>(
            r#"SELECT gp.id, gp.game_id, gp.user_id, gp.anonymous_player_id, gp.is_active,
                gp.joined_at, gp.left_at, gp.final_amount, gp.profit
            FROM game_players gp
            JOIN games g ON g.id = gp.game_id
            WHERE g.league_id = $1 AND g.status = 'completed'
            ORDER BY gp.joined_at, gp.id"#,
        )
        .bind(league_id)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }
}

#[async_trait]
impl CashEntryRepo for PgTxn {
    async fn insert_cash_entry(&mut self, entry: NewCashEntry) -> LedgerResult<CashEntry> {
        let row = sqlx::query_as::<_, CashEntryRow>(&format!(
            "INSERT INTO cash_entries (id, game_id, game_player_id, user_id, anonymous_player_id, amount, entry_type, notes, chip_count, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {CASH_ENTRY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(entry.game_id)
        .bind(entry.game_player_id)
        .bind(entry.identity.user_id())
        .bind(entry.identity.anonymous_id())
        .bind(entry.amount)
        .bind(entry.entry_type.as_str())
        .bind(&entry.notes)
        .bind(entry.chip_count)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        CashEntry::try_from(row)
    }

    async fn list_cash_entries(&mut self, game_player_id: Uuid) -> LedgerResult<Vec<CashEntry>> {
        let rows = sqlx::query_as::<_, CashEntryRow>(&format!(
            "SELECT {CASH_ENTRY_COLUMNS} FROM cash_entries WHERE game_player_id = $1 ORDER BY created_at, seq"
        ))
        .bind(game_player_id)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn list_game_entries(&mut self, game_id: Uuid) -> LedgerResult<Vec<CashEntry>> {
        let rows = sqlx::query_as::<_, CashEntryRow>(&format!(
            "SELECT {CASH_ENTRY_COLUMNS} FROM cash_entries WHERE game_id = $1 ORDER BY created_at, seq"
        ))
        .bind(game_id)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }

    async fn latest_cash_entry(
        &mut self,
        game_player_id: Uuid,
        entry_type: EntryType,
    ) -> LedgerResult<Option<CashEntry>> {
        let row = sqlx::query_as::<_, CashEntryRow>(&format!(
            "SELECT {CASH_ENTRY_COLUMNS} FROM cash_entries WHERE game_player_id = $1 AND entry_type = $2 ORDER BY created_at DESC, seq DESC LIMIT 1"
        ))
        .bind(game_player_id)
        .bind(entry_type.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CashEntry::try_from).transpose()
    }

    async fn delete_cash_entry(&mut self, id: Uuid) -> LedgerResult<()> {
        sqlx::query("DELETE FROM cash_entries WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_player_entries(&mut self, game_player_id: Uuid) -> LedgerResult<u64> {
        let result = sqlx::query("DELETE FROM cash_entries WHERE game_player_id = $1")
            .bind(game_player_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_completed_league_entries(
        &mut self,
        league_id: Uuid,
    ) -> LedgerResult<Vec<CashEntry>> {
        let rows = sqlx::query_as::<_, CashEntryRow>(
            r#"SELECT ce.id, ce.seq, ce.game_id, ce.game_player_id, ce.user_id, ce.anonymous_player_id,
                ce.amount, ce.entry_type, ce.notes, ce.chip_count, ce.created_at
            FROM cash_entries ce
            JOIN games g ON g.id = ce.game_id
            WHERE g.league_id = $1 AND g.status = 'completed'
            ORDER BY ce.created_at, ce.seq"#,
        )
        .bind(league_id)
        .fetch_all(&mut *self.tx)
        .await?;
        convert_all(rows)
    }
}
