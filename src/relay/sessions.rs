use tracing::{debug, info};

use crate::store::{ActiveSession, RoomPair, SessionStore};
use crate::AppResult;

/// Session lifecycle and display identity, on top of the store's atomic
/// create-or-fetch primitives.
#[derive(Clone)]
pub struct SessionManager {
    store: SessionStore,
}

impl SessionManager {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Idempotent join: an existing active session is returned as-is (with
    /// missing contact fields backfilled), otherwise one is created
    /// atomically, pseudonym included when the pair is anonymous.
    pub async fn handle_member_join(
        &self,
        room_pair: &RoomPair,
        user_uuid: &str,
        user_name: Option<&str>,
        user_number: Option<&str>,
    ) -> AppResult<(ActiveSession, bool)> {
        if let Some(existing) = self.store.get_active_session(room_pair.id, user_uuid).await? {
            let learned_name = user_name.filter(|_| existing.user_name.is_none());
            let learned_number = user_number.filter(|_| existing.user_number.is_none());
            if learned_name.is_some() || learned_number.is_some() {
                self.store
                    .update_session_contact(existing.id, learned_name, learned_number)
                    .await?;
                let patched = self
                    .store
                    .get_session_by_id(existing.id)
                    .await?
                    .unwrap_or(existing);
                return Ok((patched, false));
            }
            return Ok((existing, false));
        }

        let (session, is_new) = self
            .store
            .create_session_with_pseudonym(
                room_pair.id,
                user_uuid,
                user_name,
                user_number,
                room_pair.anonymous_mode,
            )
            .await?;
        info!(
            pair = room_pair.id,
            pseudonym = session.pseudonym.as_deref().unwrap_or("none"),
            "member joined"
        );
        Ok((session, is_new))
    }

    /// Mark the user's session in this pair as left. Returns the ended
    /// session for notification purposes, or `None` if there was nothing
    /// to end.
    pub async fn handle_member_leave(
        &self,
        room_pair: &RoomPair,
        user_uuid: &str,
    ) -> AppResult<Option<ActiveSession>> {
        let Some(active) = self.store.get_active_session(room_pair.id, user_uuid).await? else {
            debug!(pair = room_pair.id, "no active session to end");
            return Ok(None);
        };
        self.store.end_session(active.id).await
    }

    /// Active session for a user anywhere: lobby sessions take precedence
    /// over a direct-DM session.
    pub async fn get_session_for_user(&self, user_uuid: &str) -> AppResult<Option<ActiveSession>> {
        if let Some(lobby) = self.store.get_active_session_by_user(user_uuid).await? {
            return Ok(Some(lobby));
        }
        self.store.get_direct_dm_session(user_uuid).await
    }

    /// Displayable identity for a session.
    ///
    /// Lobby sessions use the pseudonym when the pair is anonymous; direct
    /// DMs use theirs only when `dm_anonymous` is set, since lobby
    /// anonymity policy does not apply to out-of-band conversations. After
    /// that: real name, then number, then a truncated uuid.
    pub fn get_display_name(
        &self,
        session: &ActiveSession,
        room_pair: Option<&RoomPair>,
        dm_anonymous: bool,
    ) -> String {
        let pseudonym_applies = if session.is_direct_dm || room_pair.is_none() {
            dm_anonymous
        } else {
            room_pair.is_some_and(|p| p.anonymous_mode)
        };

        if pseudonym_applies {
            if let Some(pseudonym) = &session.pseudonym {
                return pseudonym.clone();
            }
        }
        if let Some(name) = &session.user_name {
            return name.clone();
        }
        if let Some(number) = &session.user_number {
            return number.clone();
        }
        let short: String = session.user_uuid.chars().take(8).collect();
        format!("{short}...")
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{test_store, ActiveSession, RoomPair, SessionStatus};

    use super::*;

    fn pair(anonymous_mode: bool) -> RoomPair {
        RoomPair {
            id: 1,
            lobby_group_id: "lobby-1".to_owned(),
            control_group_id: "control-1".to_owned(),
            anonymous_mode,
            dm_anonymous_mode: false,
            send_confirmations: true,
            greeting_message: None,
            created_by: "admin".to_owned(),
            control_room_admins: None,
            created_at: 0,
        }
    }

    fn session() -> ActiveSession {
        ActiveSession {
            id: 1,
            room_pair_id: 1,
            user_uuid: "abcdef12-3456-7890-abcd-ef1234567890".to_owned(),
            user_name: Some("Alice".to_owned()),
            user_number: Some("+15551234567".to_owned()),
            pseudonym: Some("User Q".to_owned()),
            is_direct_dm: false,
            join_notification_timestamp: None,
            status: SessionStatus::Active,
            joined_at: 0,
            left_at: None,
        }
    }

    #[tokio::test]
    async fn display_name_uses_pseudonym_in_anonymous_lobby() {
        let mgr = SessionManager::new(test_store().await);
        assert_eq!(mgr.get_display_name(&session(), Some(&pair(true)), false), "User Q");
        assert_eq!(mgr.get_display_name(&session(), Some(&pair(false)), false), "Alice");
    }

    #[tokio::test]
    async fn display_name_direct_dm_bypasses_lobby_anonymity() {
        let mgr = SessionManager::new(test_store().await);
        let mut s = session();
        s.is_direct_dm = true;

        // Lobby anonymity does not leak onto a direct DM session.
        assert_eq!(mgr.get_display_name(&s, Some(&pair(true)), false), "Alice");
        // Unless direct-DM anonymity itself is on.
        assert_eq!(mgr.get_display_name(&s, None, true), "User Q");
    }

    #[tokio::test]
    async fn display_name_falls_back_to_number_then_uuid() {
        let mgr = SessionManager::new(test_store().await);
        let mut s = session();
        s.pseudonym = None;
        s.user_name = None;
        assert_eq!(mgr.get_display_name(&s, Some(&pair(false)), false), "+15551234567");

        s.user_number = None;
        assert_eq!(mgr.get_display_name(&s, Some(&pair(false)), false), "abcdef12...");
    }

    #[tokio::test]
    async fn member_join_is_idempotent() {
        let store = test_store().await;
        let mgr = SessionManager::new(store.clone());
        let pair = store
            .create_room_pair("lobby-1", "control-1", "admin", None, false)
            .await
            .unwrap();

        let (first, is_new) = mgr
            .handle_member_join(&pair, "u1", Some("Alice"), None)
            .await
            .unwrap();
        assert!(is_new);

        let (second, is_new) = mgr
            .handle_member_join(&pair, "u1", None, Some("+15551234567"))
            .await
            .unwrap();
        assert!(!is_new);
        assert_eq!(second.id, first.id);
        // Contact fields learned on the repeat join are kept.
        assert_eq!(second.user_number.as_deref(), Some("+15551234567"));
        assert_eq!(second.user_name.as_deref(), Some("Alice"));

        assert_eq!(store.get_active_sessions_for_pair(pair.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn member_leave_ends_once() {
        let store = test_store().await;
        let mgr = SessionManager::new(store.clone());
        let pair = store
            .create_room_pair("lobby-1", "control-1", "admin", None, false)
            .await
            .unwrap();

        assert!(mgr.handle_member_leave(&pair, "u1").await.unwrap().is_none());

        mgr.handle_member_join(&pair, "u1", None, None).await.unwrap();
        let ended = mgr.handle_member_leave(&pair, "u1").await.unwrap().unwrap();
        assert_eq!(ended.status, SessionStatus::Left);

        assert!(mgr.handle_member_leave(&pair, "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lobby_session_takes_precedence_over_direct_dm() {
        let store = test_store().await;
        let mgr = SessionManager::new(store.clone());
        let pair = store
            .create_room_pair("lobby-1", "control-1", "admin", None, false)
            .await
            .unwrap();
        let other = store
            .create_room_pair("lobby-2", "control-2", "admin", None, false)
            .await
            .unwrap();

        store
            .get_or_create_direct_dm_session(pair.id, "u1", None, None, false)
            .await
            .unwrap();
        let (lobby_session, _) = mgr
            .handle_member_join(&other, "u1", None, None)
            .await
            .unwrap();

        let found = mgr.get_session_for_user("u1").await.unwrap().unwrap();
        assert_eq!(found.id, lobby_session.id);
        assert!(!found.is_direct_dm);
    }
}
