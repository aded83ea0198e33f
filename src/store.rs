mod mappings;
mod model;
mod pairs;
mod sessions;

pub use model::{ActiveSession, Direction, RelayMapping, RelayStats, RoomPair, SessionStatus};
pub use pairs::PENDING_LOBBY;

use sqlx::SqlitePool;

use crate::AppResult;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS room_pairs (
    id INTEGER PRIMARY KEY,
    lobby_group_id TEXT NOT NULL UNIQUE,
    control_group_id TEXT NOT NULL UNIQUE,
    anonymous_mode INTEGER NOT NULL DEFAULT 0,
    dm_anonymous_mode INTEGER NOT NULL DEFAULT 0,
    send_confirmations INTEGER NOT NULL DEFAULT 1,
    greeting_message TEXT,
    created_by TEXT NOT NULL,
    control_room_admins TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS active_sessions (
    id INTEGER PRIMARY KEY,
    room_pair_id INTEGER NOT NULL,
    user_uuid TEXT NOT NULL,
    user_name TEXT,
    user_number TEXT,
    pseudonym TEXT,
    is_direct_dm INTEGER NOT NULL DEFAULT 0,
    join_notification_timestamp INTEGER,
    status TEXT NOT NULL DEFAULT 'active',
    joined_at INTEGER NOT NULL,
    left_at INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_sessions_active
    ON active_sessions (room_pair_id, user_uuid, is_direct_dm) WHERE status = 'active';
CREATE UNIQUE INDEX IF NOT EXISTS uq_sessions_pair_pseudonym
    ON active_sessions (room_pair_id, pseudonym) WHERE pseudonym IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_sessions_user ON active_sessions (user_uuid);

CREATE TABLE IF NOT EXISTS relay_mappings (
    id INTEGER PRIMARY KEY,
    session_id INTEGER NOT NULL,
    forwarded_message_timestamp INTEGER NOT NULL UNIQUE,
    original_sender_uuid TEXT NOT NULL,
    direction TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mappings_session ON relay_mappings (session_id);
"#;

/// SQLite-backed store for room pairs, sessions and relay mappings.
///
/// This is the only shared mutable state in the relay core; every handler
/// reads latest committed rows and all writes are atomic per row.
#[derive(Clone)]
pub struct SessionStore {
    pub(crate) pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> AppResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> SessionStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SessionStore::new(pool);
    store.init_schema().await.unwrap();
    store
}
