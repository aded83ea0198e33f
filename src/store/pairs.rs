use tracing::info;

use crate::{now_millis, AppResult};

use super::{RoomPair, SessionStore};

/// Sentinel lobby id for a control room that has not been linked to a lobby
/// yet. Real Signal group ids are base64, so this can never collide.
pub const PENDING_LOBBY: &str = "__pending__";

impl SessionStore {
    pub async fn create_room_pair(
        &self,
        lobby_group_id: &str,
        control_group_id: &str,
        created_by: &str,
        greeting_message: Option<&str>,
        anonymous_mode: bool,
    ) -> AppResult<RoomPair> {
        let done = sqlx::query(
            "INSERT INTO room_pairs \
             (lobby_group_id,control_group_id,anonymous_mode,greeting_message,created_by,created_at) \
             VALUES (?,?,?,?,?,?)",
        )
        .bind(lobby_group_id)
        .bind(control_group_id)
        .bind(anonymous_mode)
        .bind(greeting_message)
        .bind(created_by)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        info!(pair = done.last_insert_rowid(), "created room pair");
        self.get_room_pair_by_id(done.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("room pair vanished after insert"))
    }

    pub async fn get_room_pair_by_id(&self, pair_id: i64) -> AppResult<Option<RoomPair>> {
        Ok(
            sqlx::query_as::<_, RoomPair>("SELECT * FROM room_pairs WHERE id=?")
                .bind(pair_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn get_room_pair_by_lobby(&self, lobby_group_id: &str) -> AppResult<Option<RoomPair>> {
        Ok(
            sqlx::query_as::<_, RoomPair>("SELECT * FROM room_pairs WHERE lobby_group_id=?")
                .bind(lobby_group_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn get_room_pair_by_control(
        &self,
        control_group_id: &str,
    ) -> AppResult<Option<RoomPair>> {
        Ok(
            sqlx::query_as::<_, RoomPair>("SELECT * FROM room_pairs WHERE control_group_id=?")
                .bind(control_group_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn get_all_room_pairs(&self) -> AppResult<Vec<RoomPair>> {
        Ok(
            sqlx::query_as::<_, RoomPair>("SELECT * FROM room_pairs ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// The currently configured control room: the oldest pair. Kept in the
    /// store rather than in memory so it survives restarts and stays
    /// consistent across concurrent handlers.
    pub async fn get_active_control_room(&self) -> AppResult<Option<RoomPair>> {
        Ok(
            sqlx::query_as::<_, RoomPair>("SELECT * FROM room_pairs ORDER BY id LIMIT 1")
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Complete a placeholder pair by binding its lobby side.
    pub async fn attach_lobby(&self, pair_id: i64, lobby_group_id: &str) -> AppResult<RoomPair> {
        sqlx::query("UPDATE room_pairs SET lobby_group_id=? WHERE id=?")
            .bind(lobby_group_id)
            .bind(pair_id)
            .execute(&self.pool)
            .await?;
        self.get_room_pair_by_id(pair_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("room pair {pair_id} not found"))
    }

    pub async fn set_anonymous_mode(&self, pair_id: i64, enabled: bool) -> AppResult<()> {
        sqlx::query("UPDATE room_pairs SET anonymous_mode=? WHERE id=?")
            .bind(enabled)
            .bind(pair_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_dm_anonymous_mode(&self, pair_id: i64, enabled: bool) -> AppResult<()> {
        sqlx::query("UPDATE room_pairs SET dm_anonymous_mode=? WHERE id=?")
            .bind(enabled)
            .bind(pair_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_send_confirmations(&self, pair_id: i64, enabled: bool) -> AppResult<()> {
        sqlx::query("UPDATE room_pairs SET send_confirmations=? WHERE id=?")
            .bind(enabled)
            .bind(pair_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_greeting(&self, pair_id: i64, greeting: Option<&str>) -> AppResult<()> {
        sqlx::query("UPDATE room_pairs SET greeting_message=? WHERE id=?")
            .bind(greeting)
            .bind(pair_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_control_room_admins(
        &self,
        pair_id: i64,
        admins: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE room_pairs SET control_room_admins=? WHERE id=?")
            .bind(admins)
            .bind(pair_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes the pairing only; sessions referencing it are left in place
    /// and later lookups by pair id simply miss.
    pub async fn delete_room_pair(&self, pair_id: i64) -> AppResult<bool> {
        let done = sqlx::query("DELETE FROM room_pairs WHERE id=?")
            .bind(pair_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
