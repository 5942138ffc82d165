use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::entries::check_bounds;
use crate::ledger::{require_member, LedgerError, LedgerResult};
use crate::models::{
    AnonymousPlayer, EntryType, League, LeaderboardRow, LeagueMember, LeagueMembership,
    MemberRole, PlayerIdentity,
};
use crate::services::invite_code;
use crate::services::object_storage::{extension_for, ObjectStorage};
use crate::store::{CashEntryRepo, GamePlayerRepo, LeagueRepo, MemberRepo, Store, StoreTxn};

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const INVITE_CODE_ATTEMPTS: usize = 8;

/// Leagues, memberships, anonymous players and the cross-game leaderboard.
#[derive(Clone)]
pub struct LeagueDirectory {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
}

fn clean_name(name: &str, what: &str) -> LedgerResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation(format!("{what} is required")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(LedgerError::validation(format!(
            "{what} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

async fn require_admin<T: StoreTxn + ?Sized>(
    tx: &mut T,
    league_id: Uuid,
    user_id: Uuid,
) -> LedgerResult<LeagueMember> {
    let member = require_member(tx, league_id, user_id).await?;
    if !member.is_admin() {
        return Err(LedgerError::forbidden("League admin access required"));
    }
    Ok(member)
}

async fn unused_invite_code<T: StoreTxn + ?Sized>(tx: &mut T) -> LedgerResult<String> {
    for _ in 0..INVITE_CODE_ATTEMPTS {
        let code = invite_code::generate();
        if tx.find_league_by_code(&code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(LedgerError::Internal("could not allocate an invite code".into()))
}

async fn membership<T: StoreTxn + ?Sized>(
    tx: &mut T,
    league: League,
    role: MemberRole,
) -> LedgerResult<LeagueMembership> {
    let member_count = tx
        .list_members(league.id)
        .await?
        .iter()
        .filter(|m| m.is_active)
        .count();
    Ok(LeagueMembership {
        league,
        role,
        member_count,
    })
}

/// Accepts raw base64 or a `data:<type>;base64,` URL.
fn decode_image(payload: &str) -> LedgerResult<Vec<u8>> {
    let raw = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|_| LedgerError::validation("Image is not valid base64"))
}

impl LeagueDirectory {
    pub fn new(store: Arc<dyn Store>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { store, storage }
    }

    pub async fn create_league(
        &self,
        user_id: Uuid,
        name: &str,
        buy_in: Option<Decimal>,
        display_name: &str,
    ) -> LedgerResult<LeagueMembership> {
        let name = clean_name(name, "League name")?;
        let display_name = clean_name(display_name, "Display name")?;
        let buy_in = buy_in.unwrap_or(Decimal::ZERO);
        check_bounds(buy_in, "Buy-in")?;

        let mut tx = self.store.begin().await?;
        let now = Utc::now();
        let league = League {
            id: Uuid::new_v4(),
            name,
            invite_code: unused_invite_code(tx.as_mut()).await?,
            buy_in,
            image_url: None,
            admin_id: user_id,
            created_at: now,
        };
        tx.insert_league(&league).await?;
        tx.insert_member(&LeagueMember {
            league_id: league.id,
            user_id,
            display_name,
            role: MemberRole::Admin,
            is_active: true,
            joined_at: now,
        })
        .await?;
        tx.commit().await?;

        tracing::info!(league_id = %league.id, admin_id = %user_id, "league created");
        Ok(LeagueMembership {
            league,
            role: MemberRole::Admin,
            member_count: 1,
        })
    }

    pub async fn join_league(
        &self,
        user_id: Uuid,
        code: &str,
        display_name: &str,
    ) -> LedgerResult<LeagueMembership> {
        let display_name = clean_name(display_name, "Display name")?;
        let mut tx = self.store.begin().await?;
        let league = tx
            .find_league_by_code(&invite_code::normalize(code))
            .await?
            .ok_or(LedgerError::NotFound("League"))?;

        let role = match tx.find_member(league.id, user_id).await? {
            Some(member) if member.is_active => return Err(LedgerError::AlreadyActive),
            Some(member) => {
                tx.set_member_active(league.id, user_id, true).await?;
                member.role
            }
            None => {
                tx.insert_member(&LeagueMember {
                    league_id: league.id,
                    user_id,
                    display_name,
                    role: MemberRole::Member,
                    is_active: true,
                    joined_at: Utc::now(),
                })
                .await?;
                MemberRole::Member
            }
        };
        let joined = membership(tx.as_mut(), league, role).await?;
        tx.commit().await?;

        tracing::info!(league_id = %joined.league.id, %user_id, "member joined league");
        Ok(joined)
    }

    pub async fn get_league(&self, user_id: Uuid, league_id: Uuid) -> LedgerResult<LeagueMembership> {
        let mut tx = self.store.begin().await?;
        let league = tx
            .get_league(league_id)
            .await?
            .ok_or(LedgerError::NotFound("League"))?;
        let member = require_member(tx.as_mut(), league_id, user_id).await?;
        membership(tx.as_mut(), league, member.role).await
    }

    pub async fn list_leagues(&self, user_id: Uuid) -> LedgerResult<Vec<LeagueMembership>> {
        let mut tx = self.store.begin().await?;
        let rows = tx.list_leagues_for_user(user_id).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (league, member) in rows {
            out.push(membership(tx.as_mut(), league, member.role).await?);
        }
        Ok(out)
    }

    pub async fn list_members(
        &self,
        user_id: Uuid,
        league_id: Uuid,
    ) -> LedgerResult<Vec<LeagueMember>> {
        let mut tx = self.store.begin().await?;
        require_member(tx.as_mut(), league_id, user_id).await?;
        tx.list_members(league_id).await
    }

    /// Soft removal. The member's history in past games is kept.
    pub async fn deactivate_member(
        &self,
        admin_id: Uuid,
        league_id: Uuid,
        user_id: Uuid,
    ) -> LedgerResult<LeagueMember> {
        if admin_id == user_id {
            return Err(LedgerError::validation("Admins cannot deactivate themselves"));
        }
        let mut tx = self.store.begin().await?;
        require_admin(tx.as_mut(), league_id, admin_id).await?;
        let mut member = tx
            .find_member(league_id, user_id)
            .await?
            .ok_or(LedgerError::NotFound("Member"))?;
        if member.is_active {
            tx.set_member_active(league_id, user_id, false).await?;
            member.is_active = false;
        }
        tx.commit().await?;

        tracing::info!(%league_id, %user_id, by = %admin_id, "member deactivated");
        Ok(member)
    }

    pub async fn regenerate_invite_code(
        &self,
        admin_id: Uuid,
        league_id: Uuid,
    ) -> LedgerResult<League> {
        let mut tx = self.store.begin().await?;
        require_admin(tx.as_mut(), league_id, admin_id).await?;
        let mut league = tx
            .get_league(league_id)
            .await?
            .ok_or(LedgerError::NotFound("League"))?;
        league.invite_code = unused_invite_code(tx.as_mut()).await?;
        tx.update_league(&league).await?;
        tx.commit().await?;

        tracing::info!(%league_id, "invite code regenerated");
        Ok(league)
    }

    pub async fn create_anonymous_player(
        &self,
        user_id: Uuid,
        league_id: Uuid,
        name: &str,
    ) -> LedgerResult<AnonymousPlayer> {
        let name = clean_name(name, "Player name")?;
        let mut tx = self.store.begin().await?;
        require_member(tx.as_mut(), league_id, user_id).await?;
        let player = AnonymousPlayer {
            id: Uuid::new_v4(),
            league_id,
            name,
            created_by: user_id,
            created_at: Utc::now(),
        };
        tx.insert_anonymous_player(&player).await?;
        tx.commit().await?;
        Ok(player)
    }

    pub async fn list_anonymous_players(
        &self,
        user_id: Uuid,
        league_id: Uuid,
    ) -> LedgerResult<Vec<AnonymousPlayer>> {
        let mut tx = self.store.begin().await?;
        require_member(tx.as_mut(), league_id, user_id).await?;
        tx.list_anonymous_players(league_id).await
    }

    /// Lifetime standings over completed games, best profit first.
    pub async fn leaderboard(
        &self,
        user_id: Uuid,
        league_id: Uuid,
    ) -> LedgerResult<Vec<LeaderboardRow>> {
        let mut tx = self.store.begin().await?;
        require_member(tx.as_mut(), league_id, user_id).await?;
        let seats = tx.list_completed_league_players(league_id).await?;
        let entries = tx.list_completed_league_entries(league_id).await?;

        let mut names: HashMap<PlayerIdentity, String> = tx
            .list_members(league_id)
            .await?
            .into_iter()
            .map(|m| (PlayerIdentity::Registered(m.user_id), m.display_name))
            .collect();
        for anon in tx.list_anonymous_players(league_id).await? {
            names.insert(PlayerIdentity::Anonymous(anon.id), anon.name);
        }

        // seats decide who played; entries only carry the money
        let mut totals: HashMap<PlayerIdentity, (HashSet<Uuid>, Decimal, Decimal)> =
            HashMap::new();
        for seat in &seats {
            let (games, _, _) = totals.entry(seat.identity).or_default();
            games.insert(seat.game_id);
        }
        for entry in &entries {
            let (_, ins, outs) = totals.entry(entry.identity).or_default();
            let total = match entry.entry_type {
                EntryType::BuyIn => ins,
                EntryType::BuyOut => outs,
            };
            *total = total.checked_add(entry.amount).ok_or_else(|| {
                LedgerError::Internal("leaderboard totals overflowed".into())
            })?;
        }

        let mut rows: Vec<LeaderboardRow> = totals
            .into_iter()
            .map(|(identity, (games, ins, outs))| LeaderboardRow {
                display_name: names
                    .get(&identity)
                    .cloned()
                    .unwrap_or_else(|| "Unknown player".to_string()),
                identity,
                games_played: games.len(),
                total_buy_ins: ins,
                total_buy_outs: outs,
                total_profit: outs - ins,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_profit
                .cmp(&a.total_profit)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(rows)
    }

    pub async fn upload_image(
        &self,
        admin_id: Uuid,
        league_id: Uuid,
        image_base64: &str,
        content_type: &str,
    ) -> LedgerResult<League> {
        if extension_for(content_type).is_none() {
            return Err(LedgerError::validation(
                "Image must be image/png, image/jpeg or image/webp",
            ));
        }
        let bytes = decode_image(image_base64)?;
        if bytes.is_empty() {
            return Err(LedgerError::validation("Image is empty"));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(LedgerError::validation("Image exceeds 5 MiB"));
        }

        // Check permissions before spending an upload.
        {
            let mut tx = self.store.begin().await?;
            require_admin(tx.as_mut(), league_id, admin_id).await?;
        }
        let url = self.storage.upload(Bytes::from(bytes), content_type).await?;

        let mut tx = self.store.begin().await?;
        require_admin(tx.as_mut(), league_id, admin_id).await?;
        let mut league = tx
            .get_league(league_id)
            .await?
            .ok_or(LedgerError::NotFound("League"))?;
        league.image_url = Some(url);
        tx.update_league(&league).await?;
        tx.commit().await?;

        tracing::info!(%league_id, "league image updated");
        Ok(league)
    }
}
