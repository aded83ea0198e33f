use std::collections::HashSet;

use rand::seq::IndexedRandom;
use tracing::{info, warn};

use crate::{now_millis, AppResult};

use super::{ActiveSession, SessionStore};

/// Retries on pseudonym unique-constraint collisions (two concurrent
/// creations drawing the same random label).
const MAX_PSEUDONYM_ATTEMPTS: u32 = 3;

/// Pick a random pseudonym not yet used in the room pair. Single letters
/// first, then double letters, then a numbered fallback. Collisions are
/// checked against every session of the pair, ended ones included, so a
/// label is not recycled right after its owner leaves.
fn unused_pseudonym(used: &HashSet<String>, prefix: &str) -> String {
    let mut rng = rand::rng();

    let singles: Vec<String> = ('A'..='Z')
        .map(|c| format!("{prefix}{c}"))
        .filter(|p| !used.contains(p))
        .collect();
    if let Some(p) = singles.choose(&mut rng) {
        return p.clone();
    }

    let mut doubles = Vec::new();
    for a in 'A'..='Z' {
        for b in 'A'..='Z' {
            let p = format!("{prefix}{a}{b}");
            if !used.contains(&p) {
                doubles.push(p);
            }
        }
    }
    if let Some(p) = doubles.choose(&mut rng) {
        return p.clone();
    }

    let mut i = 1u32;
    loop {
        let p = format!("{prefix}{i}");
        if !used.contains(&p) {
            return p;
        }
        i += 1;
    }
}

impl SessionStore {
    /// Atomically create an active session, assigning a pseudonym in the
    /// same insert when `anonymous_mode` is on.
    ///
    /// The partial unique index on (room_pair_id, user_uuid, is_direct_dm)
    /// over active rows closes the rapid-rejoin race: if a concurrent
    /// creation won, the insert fails and the existing row is returned with
    /// `created=false`.
    pub async fn create_session_with_pseudonym(
        &self,
        room_pair_id: i64,
        user_uuid: &str,
        user_name: Option<&str>,
        user_number: Option<&str>,
        anonymous_mode: bool,
    ) -> AppResult<(ActiveSession, bool)> {
        self.insert_session(room_pair_id, user_uuid, user_name, user_number, false, {
            if anonymous_mode { Some("User ") } else { None }
        })
        .await
    }

    /// Atomic get-or-create for a user messaging the bot without joining a
    /// lobby. On an existing session, missing contact fields are backfilled
    /// and a pseudonym is assigned late if `dm_anonymous_mode` was switched
    /// on since creation.
    pub async fn get_or_create_direct_dm_session(
        &self,
        room_pair_id: i64,
        user_uuid: &str,
        user_name: Option<&str>,
        user_number: Option<&str>,
        dm_anonymous_mode: bool,
    ) -> AppResult<(ActiveSession, bool)> {
        if let Some(existing) = self.get_direct_dm_session(user_uuid).await? {
            let pseudonym = if dm_anonymous_mode && existing.pseudonym.is_none() {
                let used = self.used_pseudonyms(existing.room_pair_id).await?;
                Some(unused_pseudonym(&used, "DM-"))
            } else {
                None
            };
            sqlx::query(
                "UPDATE active_sessions SET \
                 user_name=COALESCE(user_name,?), \
                 user_number=COALESCE(user_number,?), \
                 pseudonym=COALESCE(pseudonym,?) \
                 WHERE id=?",
            )
            .bind(user_name)
            .bind(user_number)
            .bind(pseudonym)
            .bind(existing.id)
            .execute(&self.pool)
            .await?;
            let session = self
                .get_session_by_id(existing.id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("session {} vanished", existing.id))?;
            return Ok((session, false));
        }

        self.insert_session(room_pair_id, user_uuid, user_name, user_number, true, {
            if dm_anonymous_mode { Some("DM-") } else { None }
        })
        .await
    }

    async fn insert_session(
        &self,
        room_pair_id: i64,
        user_uuid: &str,
        user_name: Option<&str>,
        user_number: Option<&str>,
        is_direct_dm: bool,
        pseudonym_prefix: Option<&str>,
    ) -> AppResult<(ActiveSession, bool)> {
        for _ in 0..MAX_PSEUDONYM_ATTEMPTS {
            let pseudonym = match pseudonym_prefix {
                Some(prefix) => {
                    let used = self.used_pseudonyms(room_pair_id).await?;
                    Some(unused_pseudonym(&used, prefix))
                }
                None => None,
            };

            let inserted = sqlx::query(
                "INSERT INTO active_sessions \
                 (room_pair_id,user_uuid,user_name,user_number,pseudonym,is_direct_dm,status,joined_at) \
                 VALUES (?,?,?,?,?,?,'active',?)",
            )
            .bind(room_pair_id)
            .bind(user_uuid)
            .bind(user_name)
            .bind(user_number)
            .bind(pseudonym.as_deref())
            .bind(is_direct_dm)
            .bind(now_millis())
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(done) => {
                    let id = done.last_insert_rowid();
                    info!(session = id, pair = room_pair_id, "created session");
                    let session = self
                        .get_session_by_id(id)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("session {id} vanished after insert"))?;
                    return Ok((session, true));
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    // Either another handler created the user's session
                    // first, or two creations drew the same pseudonym.
                    let existing = if is_direct_dm {
                        self.get_direct_dm_session(user_uuid).await?
                    } else {
                        self.get_active_session(room_pair_id, user_uuid).await?
                    };
                    if let Some(existing) = existing {
                        return Ok((existing, false));
                    }
                    warn!(pair = room_pair_id, "pseudonym collision, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        anyhow::bail!("no unused pseudonym after {MAX_PSEUDONYM_ATTEMPTS} attempts")
    }

    async fn used_pseudonyms(&self, room_pair_id: i64) -> AppResult<HashSet<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT pseudonym FROM active_sessions WHERE room_pair_id=? AND pseudonym IS NOT NULL",
        )
        .bind(room_pair_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn get_session_by_id(&self, session_id: i64) -> AppResult<Option<ActiveSession>> {
        Ok(
            sqlx::query_as::<_, ActiveSession>("SELECT * FROM active_sessions WHERE id=?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Active lobby session for a user in one pair. A direct-DM session
    /// with the same pair id is a separate thing and never returned here.
    pub async fn get_active_session(
        &self,
        room_pair_id: i64,
        user_uuid: &str,
    ) -> AppResult<Option<ActiveSession>> {
        Ok(sqlx::query_as::<_, ActiveSession>(
            "SELECT * FROM active_sessions \
             WHERE room_pair_id=? AND user_uuid=? AND status='active' AND is_direct_dm=0",
        )
        .bind(room_pair_id)
        .bind(user_uuid)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Most recent active lobby session for a user, across all pairs.
    /// Direct-DM sessions are excluded.
    pub async fn get_active_session_by_user(
        &self,
        user_uuid: &str,
    ) -> AppResult<Option<ActiveSession>> {
        Ok(sqlx::query_as::<_, ActiveSession>(
            "SELECT * FROM active_sessions \
             WHERE user_uuid=? AND status='active' AND is_direct_dm=0 \
             ORDER BY joined_at DESC LIMIT 1",
        )
        .bind(user_uuid)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get_direct_dm_session(&self, user_uuid: &str) -> AppResult<Option<ActiveSession>> {
        Ok(sqlx::query_as::<_, ActiveSession>(
            "SELECT * FROM active_sessions \
             WHERE user_uuid=? AND status='active' AND is_direct_dm=1",
        )
        .bind(user_uuid)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get_active_sessions_for_pair(
        &self,
        room_pair_id: i64,
    ) -> AppResult<Vec<ActiveSession>> {
        Ok(sqlx::query_as::<_, ActiveSession>(
            "SELECT * FROM active_sessions WHERE room_pair_id=? AND status='active'",
        )
        .bind(room_pair_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Backfill contact fields learned later (from a DM or a contact
    /// lookup). Known values are never overwritten.
    pub async fn update_session_contact(
        &self,
        session_id: i64,
        user_name: Option<&str>,
        user_number: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE active_sessions SET \
             user_name=COALESCE(user_name,?), user_number=COALESCE(user_number,?) \
             WHERE id=?",
        )
        .bind(user_name)
        .bind(user_number)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_join_notification(&self, session_id: i64, timestamp: i64) -> AppResult<()> {
        sqlx::query("UPDATE active_sessions SET join_notification_timestamp=? WHERE id=?")
            .bind(timestamp)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_session_by_join_notification(
        &self,
        room_pair_id: i64,
        timestamp: i64,
    ) -> AppResult<Option<ActiveSession>> {
        Ok(sqlx::query_as::<_, ActiveSession>(
            "SELECT * FROM active_sessions \
             WHERE room_pair_id=? AND join_notification_timestamp=? AND status='active'",
        )
        .bind(room_pair_id)
        .bind(timestamp)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Mark a session as left. The row is retained for history and so its
    /// pseudonym stays out of circulation.
    pub async fn end_session(&self, session_id: i64) -> AppResult<Option<ActiveSession>> {
        let done = sqlx::query(
            "UPDATE active_sessions SET status='left', left_at=? WHERE id=? AND status='active'",
        )
        .bind(now_millis())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_session_by_id(session_id).await
    }
}
