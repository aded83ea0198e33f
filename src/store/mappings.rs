use tracing::debug;

use crate::{now_millis, AppResult};

use super::{Direction, RelayMapping, RelayStats, SessionStore};

impl SessionStore {
    /// Record the correlation between a forwarded message (keyed by the
    /// timestamp it got in the control room) and its originating session.
    pub async fn create_relay_mapping(
        &self,
        session_id: i64,
        forwarded_message_timestamp: i64,
        original_sender_uuid: &str,
        direction: Direction,
    ) -> AppResult<RelayMapping> {
        let done = sqlx::query(
            "INSERT INTO relay_mappings \
             (session_id,forwarded_message_timestamp,original_sender_uuid,direction,created_at) \
             VALUES (?,?,?,?,?)",
        )
        .bind(session_id)
        .bind(forwarded_message_timestamp)
        .bind(original_sender_uuid)
        .bind(direction)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        debug!(ts = forwarded_message_timestamp, session = session_id, "mapping stored");
        let id = done.last_insert_rowid();
        sqlx::query_as::<_, RelayMapping>("SELECT * FROM relay_mappings WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("relay mapping {id} vanished after insert"))
    }

    pub async fn get_relay_mapping_by_timestamp(
        &self,
        forwarded_message_timestamp: i64,
    ) -> AppResult<Option<RelayMapping>> {
        Ok(sqlx::query_as::<_, RelayMapping>(
            "SELECT * FROM relay_mappings WHERE forwarded_message_timestamp=?",
        )
        .bind(forwarded_message_timestamp)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Drop mappings older than the retention window. Replies quoting a
    /// pruned message fall back to the join-notification path and fail
    /// gracefully.
    pub async fn cleanup_old_mappings(&self, max_age_hours: i64) -> AppResult<u64> {
        let cutoff = now_millis() - max_age_hours * 3_600_000;
        let done = sqlx::query("DELETE FROM relay_mappings WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    pub async fn relay_stats(&self) -> AppResult<RelayStats> {
        let room_pairs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM room_pairs")
            .fetch_one(&self.pool)
            .await?;
        let active_sessions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM active_sessions WHERE status='active'")
                .fetch_one(&self.pool)
                .await?;
        let day_ago = now_millis() - 24 * 3_600_000;
        let relays_today: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM relay_mappings WHERE created_at >= ?")
                .bind(day_ago)
                .fetch_one(&self.pool)
                .await?;
        let total_relays: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM relay_mappings")
            .fetch_one(&self.pool)
            .await?;

        Ok(RelayStats { room_pairs, active_sessions, relays_today, total_relays })
    }
}
