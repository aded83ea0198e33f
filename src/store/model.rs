/// A bound lobby group and control group.
///
/// Both group ids are unique across all pairs, so a group can be the lobby
/// or control side of at most one pair at a time.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomPair {
    pub id: i64,
    pub lobby_group_id: String,
    pub control_group_id: String,
    pub anonymous_mode: bool,
    pub dm_anonymous_mode: bool,
    pub send_confirmations: bool,
    pub greeting_message: Option<String>,
    pub created_by: String,
    pub control_room_admins: Option<String>,
    pub created_at: i64,
}

impl RoomPair {
    /// Uuids authorized to link lobbies to this control room, beyond the
    /// creator.
    pub fn admin_uuids(&self) -> Vec<&str> {
        self.control_room_admins
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn is_link_admin(&self, user_uuid: &str) -> bool {
        self.created_by == user_uuid || self.admin_uuids().contains(&user_uuid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Left,
}

/// A user's ongoing relay binding to one room pair.
///
/// At most one active lobby session and one active direct-DM session exist
/// per (room_pair_id, user_uuid); rows are never deleted, only transitioned
/// to `left`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveSession {
    pub id: i64,
    pub room_pair_id: i64,
    pub user_uuid: String,
    pub user_name: Option<String>,
    pub user_number: Option<String>,
    pub pseudonym: Option<String>,
    pub is_direct_dm: bool,
    pub join_notification_timestamp: Option<i64>,
    pub status: SessionStatus,
    pub joined_at: i64,
    pub left_at: Option<i64>,
}

impl ActiveSession {
    /// Where replies to this session should be delivered.
    pub fn recipient(&self) -> &str {
        self.user_number.as_deref().unwrap_or(&self.user_uuid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum Direction {
    ToControl,
    ToUser,
}

/// Correlates one forwarded message in the control room with its
/// originating session, keyed by the forwarded message's timestamp.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RelayMapping {
    pub id: i64,
    pub session_id: i64,
    pub forwarded_message_timestamp: i64,
    pub original_sender_uuid: String,
    pub direction: Direction,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub room_pairs: i64,
    pub active_sessions: i64,
    pub relays_today: i64,
    pub total_relays: i64,
}
