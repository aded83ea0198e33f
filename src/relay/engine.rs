use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::gateway::{Gateway, ReactionTarget};
use crate::store::{ActiveSession, Direction, RoomPair, SessionStore};
use crate::AppResult;

use super::SessionManager;

/// Deliberately says nothing about how (or whether) the service is
/// configured.
const GENERIC_ERROR_MSG: &str = "Service temporarily unavailable. Please try again later.";

const DEFAULT_LOBBY_GREETING: &str =
    "👋 Welcome {name}! DM me directly to reach the team privately.";

const CONFIRM_EMOJI: &str = "✅";

fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}

fn render_greeting(configured: Option<&str>, display_name: &str) -> String {
    let template = configured.unwrap_or(DEFAULT_LOBBY_GREETING);
    if template.contains("{name}") {
        template.replace("{name}", display_name)
    } else {
        format!("👋 {display_name}! {template}")
    }
}

/// The message-routing state machine between lobby users and control room
/// operators.
///
/// Stateless between calls: all session state lives in the store, which is
/// also the sole point of mutual exclusion for concurrent events.
pub struct RelayEngine {
    gateway: Arc<dyn Gateway>,
    store: SessionStore,
    sessions: SessionManager,
    direct_dm_greeting: String,
}

impl RelayEngine {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: SessionStore,
        sessions: SessionManager,
        direct_dm_greeting: String,
    ) -> Self {
        Self { gateway, store, sessions, direct_dm_greeting }
    }

    /// An incoming DM to the bot: forward it over the relay boundary.
    ///
    /// Two modes: a lobby user with an active session, or a direct DM from
    /// someone who never joined a lobby (a session is created on the fly,
    /// bound to the active control room).
    pub async fn handle_dm(
        &self,
        sender_uuid: &str,
        sender_number: Option<&str>,
        sender_name: Option<&str>,
        message_text: &str,
        timestamp: i64,
    ) -> AppResult<bool> {
        let mut sender_name = sender_name.map(str::to_owned);
        let mut sender_number = sender_number.map(str::to_owned);

        let Some(session) = self.sessions.get_session_for_user(sender_uuid).await? else {
            return self
                .handle_direct_dm(sender_uuid, sender_name, sender_number, message_text, timestamp)
                .await;
        };

        if session.user_name.is_none() && sender_name.is_none() {
            self.lookup_contact(sender_uuid, &mut sender_name, &mut sender_number).await;
        }
        let learned_name = sender_name.as_deref().filter(|_| session.user_name.is_none());
        let learned_number = sender_number
            .as_deref()
            .filter(|n| n.starts_with('+') && session.user_number.is_none());
        let session = if learned_name.is_some() || learned_number.is_some() {
            self.store
                .update_session_contact(session.id, learned_name, learned_number)
                .await?;
            self.store.get_session_by_id(session.id).await?.unwrap_or(session)
        } else {
            session
        };

        let pair = if session.is_direct_dm {
            self.store.get_active_control_room().await?
        } else {
            self.store.get_room_pair_by_id(session.room_pair_id).await?
        };
        let Some(pair) = pair else {
            // Orphaned session: its pair was deleted. Detected lazily here,
            // nothing to relay to.
            warn!(session = session.id, "no room pair for session");
            return Ok(false);
        };

        self.forward_to_control(&session, &pair, message_text, timestamp).await
    }

    async fn handle_direct_dm(
        &self,
        sender_uuid: &str,
        mut sender_name: Option<String>,
        mut sender_number: Option<String>,
        message_text: &str,
        timestamp: i64,
    ) -> AppResult<bool> {
        let Some(control) = self.store.get_active_control_room().await? else {
            warn!("dm received but no control room is configured");
            let recipient = sender_number.as_deref().unwrap_or(sender_uuid);
            self.try_send_direct(GENERIC_ERROR_MSG, recipient).await;
            return Ok(false);
        };

        if sender_name.is_none() {
            self.lookup_contact(sender_uuid, &mut sender_name, &mut sender_number).await;
        }

        let (session, is_new) = self
            .store
            .get_or_create_direct_dm_session(
                control.id,
                sender_uuid,
                sender_name.as_deref(),
                sender_number.as_deref(),
                control.dm_anonymous_mode,
            )
            .await?;

        if is_new {
            self.try_send_direct(&self.direct_dm_greeting, session.recipient()).await;
        }

        self.forward_to_control(&session, &control, message_text, timestamp).await
    }

    /// Forward a user's message into the control group, record the relay
    /// mapping keyed by the timestamp the forward got, and confirm to the
    /// sender if the pair asks for it.
    async fn forward_to_control(
        &self,
        session: &ActiveSession,
        pair: &RoomPair,
        message_text: &str,
        inbound_timestamp: i64,
    ) -> AppResult<bool> {
        let forwarded = if session.is_direct_dm {
            let display = self.sessions.get_display_name(session, None, pair.dm_anonymous_mode);
            format!("💬 [Direct] {display}: {message_text}")
        } else {
            let display = self.sessions.get_display_name(session, Some(pair), false);
            let lobby_name = self.group_display_name(&pair.lobby_group_id, "Lobby").await;
            format!("📥 [{lobby_name}] {display}: {message_text}")
        };

        let Some(sent_timestamp) =
            self.try_send_group(&forwarded, &pair.control_group_id).await
        else {
            return Ok(false);
        };

        self.store
            .create_relay_mapping(session.id, sent_timestamp, &session.user_uuid, Direction::ToControl)
            .await?;

        if pair.send_confirmations {
            self.try_react(
                &session.user_uuid,
                inbound_timestamp,
                ReactionTarget::Direct(session.recipient().to_owned()),
            )
            .await;
        }

        info!(ts = sent_timestamp, session = session.id, "forwarded message to control room");
        Ok(true)
    }

    /// A reply in the control room, quoting some earlier message. Resolved
    /// against relay mappings first, then against join notifications.
    /// Correctness depends entirely on the client preserving the quoted
    /// timestamp.
    pub async fn handle_reply_in_control(
        &self,
        control_group_id: &str,
        reply_text: &str,
        quoted_timestamp: i64,
        sender_uuid: &str,
        timestamp: i64,
    ) -> AppResult<bool> {
        let Some(mapping) = self.store.get_relay_mapping_by_timestamp(quoted_timestamp).await?
        else {
            debug!(ts = quoted_timestamp, "no relay mapping, checking join notifications");
            return self
                .handle_join_reply(control_group_id, reply_text, quoted_timestamp, sender_uuid, timestamp)
                .await;
        };

        let Some(session) = self.store.get_session_by_id(mapping.session_id).await? else {
            warn!(mapping = mapping.id, "relay mapping references a missing session");
            return Ok(false);
        };

        self.deliver_reply(&session, reply_text, control_group_id, sender_uuid, timestamp)
            .await
    }

    /// Fallback for replies quoting a join notification instead of a
    /// relayed message.
    async fn handle_join_reply(
        &self,
        control_group_id: &str,
        reply_text: &str,
        quoted_timestamp: i64,
        sender_uuid: &str,
        timestamp: i64,
    ) -> AppResult<bool> {
        let Some(pair) = self.store.get_room_pair_by_control(control_group_id).await? else {
            return Ok(false);
        };
        let Some(session) = self
            .store
            .find_session_by_join_notification(pair.id, quoted_timestamp)
            .await?
        else {
            debug!(ts = quoted_timestamp, "no join notification matches quote");
            return Ok(false);
        };

        self.deliver_reply(&session, reply_text, control_group_id, sender_uuid, timestamp)
            .await
    }

    async fn deliver_reply(
        &self,
        session: &ActiveSession,
        reply_text: &str,
        control_group_id: &str,
        sender_uuid: &str,
        timestamp: i64,
    ) -> AppResult<bool> {
        let Some(sent_timestamp) = self.try_send_direct(reply_text, session.recipient()).await
        else {
            return Ok(false);
        };

        // The reply was already delivered; its mapping is bookkeeping. A
        // reply landing on the same millisecond as a forward collides on
        // the timestamp key and is simply not recorded.
        match self
            .store
            .create_relay_mapping(session.id, sent_timestamp, sender_uuid, Direction::ToUser)
            .await
        {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(ts = sent_timestamp, "reply mapping collided with a forward")
            }
            Err(e) => return Err(e),
        }

        if timestamp > 0 {
            self.try_react(
                sender_uuid,
                timestamp,
                ReactionTarget::Group(control_group_id.to_owned()),
            )
            .await;
        }

        info!(session = session.id, "relayed reply to user");
        Ok(true)
    }

    /// A member joined some group. Only lobby groups matter, and the bot's
    /// own join must never create a session.
    pub async fn handle_member_joined(
        &self,
        group_id: &str,
        user_uuid: &str,
        bot_uuid: &str,
        user_name: Option<&str>,
        user_number: Option<&str>,
    ) -> AppResult<bool> {
        if user_uuid == bot_uuid {
            return Ok(false);
        }
        let Some(pair) = self.store.get_room_pair_by_lobby(group_id).await? else {
            return Ok(false);
        };

        let mut user_name = user_name.map(str::to_owned);
        let mut user_number = user_number.map(str::to_owned);
        if user_name.is_none() {
            self.lookup_contact(user_uuid, &mut user_name, &mut user_number).await;
        }

        let (session, is_new) = self
            .sessions
            .handle_member_join(&pair, user_uuid, user_name.as_deref(), user_number.as_deref())
            .await?;
        if !is_new {
            return Ok(true);
        }

        let display = self.sessions.get_display_name(&session, Some(&pair), false);

        // Greeting and control notification are independent sends; one
        // failing must not block the other.
        let greeting = render_greeting(pair.greeting_message.as_deref(), &display);
        self.try_send_group(&greeting, group_id).await;

        let lobby_name = self.group_display_name(group_id, "the lobby").await;
        let notification =
            format!("👋 {display} joined {lobby_name}.\n↩️ Reply to this message to reach them.");
        let Some(notification_timestamp) =
            self.try_send_group(&notification, &pair.control_group_id).await
        else {
            return Ok(false);
        };
        self.store.set_join_notification(session.id, notification_timestamp).await?;

        info!(pair = pair.id, "member joined lobby");
        Ok(true)
    }

    /// A member left a lobby: end their session and tell the control room.
    pub async fn handle_member_left(&self, group_id: &str, user_uuid: &str) -> AppResult<bool> {
        let Some(pair) = self.store.get_room_pair_by_lobby(group_id).await? else {
            return Ok(false);
        };
        let Some(ended) = self.sessions.handle_member_leave(&pair, user_uuid).await? else {
            return Ok(false);
        };

        let display = self.sessions.get_display_name(&ended, Some(&pair), false);
        let lobby_name = self.group_display_name(group_id, "the lobby").await;
        self.try_send_group(&format!("🚪 {display} left {lobby_name}."), &pair.control_group_id)
            .await;

        info!(pair = pair.id, "member left lobby");
        Ok(true)
    }

    /// `/dm` in a lobby: open a private channel with the requester.
    pub async fn handle_dm_request(&self, group_id: &str, recipient: &str) -> AppResult<bool> {
        if self.store.get_room_pair_by_lobby(group_id).await?.is_none() {
            return Ok(false);
        }
        let sent = self
            .try_send_direct(
                "💬 Private channel open.\n↩️ Reply here and I'll relay your message to the team.",
                recipient,
            )
            .await;
        Ok(sent.is_some())
    }

    async fn lookup_contact(
        &self,
        user_uuid: &str,
        name: &mut Option<String>,
        number: &mut Option<String>,
    ) {
        match self.gateway.contact_info(user_uuid).await {
            Ok(Some(contact)) => {
                if name.is_none() {
                    *name = contact.name;
                }
                if number.is_none() {
                    *number = contact.number;
                }
            }
            Ok(None) => debug!("no contact info for user"),
            Err(e) => warn!("contact lookup failed: {e:#}"),
        }
    }

    async fn group_display_name(&self, group_id: &str, fallback: &str) -> String {
        match self.gateway.group_name(group_id).await {
            Ok(Some(name)) => name,
            Ok(None) => fallback.to_owned(),
            Err(e) => {
                debug!("group name lookup failed: {e:#}");
                fallback.to_owned()
            }
        }
    }

    async fn try_send_group(&self, text: &str, group_id: &str) -> Option<i64> {
        match self.gateway.send_group_message(text, group_id).await {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("group send failed: {e:#}");
                None
            }
        }
    }

    async fn try_send_direct(&self, text: &str, recipient: &str) -> Option<i64> {
        match self.gateway.send_direct_message(text, recipient).await {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("direct send failed: {e:#}");
                None
            }
        }
    }

    async fn try_react(&self, target_author: &str, target_timestamp: i64, target: ReactionTarget) {
        if let Err(e) = self
            .gateway
            .send_reaction(CONFIRM_EMOJI, target_author, target_timestamp, target)
            .await
        {
            debug!("reaction failed: {e:#}");
        }
    }
}
