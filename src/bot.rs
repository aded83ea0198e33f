//! Event and command dispatcher: turns inbound envelopes into engine calls
//! and implements the in-chat admin commands.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::gateway::{Gateway, InboundMessage};
use crate::relay::RelayEngine;
use crate::store::{SessionStore, PENDING_LOBBY};
use crate::AppResult;

const HELP_TEXT: &str = "🤖 Commands:\n\
    /setup control — register this group as the control room\n\
    /setup lobby — link this group as the lobby\n\
    /unpair — remove the pairing (sessions are kept)\n\
    /status — pair settings and relay counters\n\
    /anonymous on|off — pseudonyms for lobby members\n\
    /dm-anonymous on|off — pseudonyms for direct DMs\n\
    /confirmations on|off — ✅ reactions on relayed messages\n\
    /greeting [text] — lobby welcome message, {name} is replaced\n\
    /authorize <uuid> | list | revoke <uuid> — linking admins\n\
    /dm — open a private channel with me\n\
    /help — this message";

const NOT_ADMIN: &str = "Only group admins can do that.";
const NOT_CONTROL: &str = "Run this in a control room.";

enum Setting {
    Anonymous,
    DmAnonymous,
    Confirmations,
}

fn parse_toggle(arg: Option<&str>) -> Option<bool> {
    match arg.map(str::to_ascii_lowercase).as_deref() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

pub struct Bot {
    gateway: Arc<dyn Gateway>,
    store: SessionStore,
    engine: RelayEngine,
    bot_uuid: String,
}

impl Bot {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: SessionStore,
        engine: RelayEngine,
        bot_uuid: String,
    ) -> Self {
        Self { gateway, store, engine, bot_uuid }
    }

    /// Route one inbound envelope. Membership changes, commands, control
    /// room replies and DMs can all arrive in the same envelope; each part
    /// is handled independently.
    pub async fn handle_event(&self, msg: &InboundMessage) -> AppResult<()> {
        let Some(group_id) = msg.group_id.as_deref() else {
            return self.handle_dm_event(msg).await;
        };

        for member in &msg.added_members {
            self.engine
                .handle_member_joined(
                    group_id,
                    &member.uuid,
                    &self.bot_uuid,
                    None,
                    member.number.as_deref(),
                )
                .await?;
        }
        for member in &msg.removed_members {
            self.engine.handle_member_left(group_id, &member.uuid).await?;
        }

        let Some(text) = msg.text.as_deref() else {
            return Ok(());
        };
        let trimmed = text.trim();
        if trimmed.starts_with('/') {
            return self.handle_command(group_id, trimmed, msg).await;
        }
        if let Some(quoted) = msg.quoted_timestamp {
            // Quoted replies only mean something in a control room; lobby
            // chatter is never relayed.
            if self.store.get_room_pair_by_control(group_id).await?.is_some() {
                self.engine
                    .handle_reply_in_control(group_id, text, quoted, &msg.source_uuid, msg.timestamp)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_dm_event(&self, msg: &InboundMessage) -> AppResult<()> {
        let Some(text) = msg.text.as_deref() else {
            return Ok(());
        };
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("/help") {
            let recipient = msg.source_number.as_deref().unwrap_or(&msg.source_uuid);
            if let Err(e) = self.gateway.send_direct_message(HELP_TEXT, recipient).await {
                warn!("help reply failed: {e:#}");
            }
            return Ok(());
        }
        self.engine
            .handle_dm(
                &msg.source_uuid,
                msg.source_number.as_deref(),
                msg.source_name.as_deref(),
                text,
                msg.timestamp,
            )
            .await?;
        Ok(())
    }

    async fn handle_command(
        &self,
        group_id: &str,
        text: &str,
        msg: &InboundMessage,
    ) -> AppResult<()> {
        let mut parts = text.split_whitespace();
        let command = parts.next().unwrap_or("").to_ascii_lowercase();
        let sender = msg.source_uuid.as_str();
        debug!(command, "handling command");

        let reply = match command.as_str() {
            "/help" => HELP_TEXT.to_owned(),
            "/setup" => self.cmd_setup(group_id, parts.next(), sender).await?,
            "/unpair" => self.cmd_unpair(group_id, sender).await?,
            "/status" => self.cmd_status(group_id, sender).await?,
            "/anonymous" => {
                self.cmd_toggle(group_id, sender, Setting::Anonymous, parts.next()).await?
            }
            "/dm-anonymous" => {
                self.cmd_toggle(group_id, sender, Setting::DmAnonymous, parts.next()).await?
            }
            "/confirmations" => {
                self.cmd_toggle(group_id, sender, Setting::Confirmations, parts.next()).await?
            }
            "/greeting" => {
                let rest = text
                    .splitn(2, char::is_whitespace)
                    .nth(1)
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                self.cmd_greeting(group_id, sender, rest).await?
            }
            "/authorize" => {
                self.cmd_authorize(group_id, sender, parts.next(), parts.next()).await?
            }
            "/dm" => {
                let recipient = msg.source_number.as_deref().unwrap_or(sender);
                if self.engine.handle_dm_request(group_id, recipient).await? {
                    return Ok(());
                }
                "Run /dm in a lobby group.".to_owned()
            }
            _ => "Unknown command. Try /help.".to_owned(),
        };

        self.say(group_id, &reply).await;
        Ok(())
    }

    async fn cmd_setup(
        &self,
        group_id: &str,
        target: Option<&str>,
        sender: &str,
    ) -> AppResult<String> {
        match target.map(str::to_ascii_lowercase).as_deref() {
            Some("control") => {
                if !self.is_group_admin(group_id, sender).await {
                    return Ok(NOT_ADMIN.to_owned());
                }
                if self.store.get_room_pair_by_control(group_id).await?.is_some() {
                    return Ok("This group is already a control room.".to_owned());
                }
                if self.store.get_room_pair_by_lobby(PENDING_LOBBY).await?.is_some() {
                    return Ok(
                        "Another control room is still waiting for its lobby. Finish or /unpair it first."
                            .to_owned(),
                    );
                }
                self.store
                    .create_room_pair(PENDING_LOBBY, group_id, sender, None, false)
                    .await?;
                Ok("🛠️ Control room registered. Run /setup lobby in the lobby group to link it."
                    .to_owned())
            }
            Some("lobby") => {
                if !self.is_group_admin(group_id, sender).await {
                    return Ok(NOT_ADMIN.to_owned());
                }
                if self.store.get_room_pair_by_lobby(group_id).await?.is_some() {
                    return Ok("This group is already a lobby.".to_owned());
                }
                let Some(pending) = self.store.get_room_pair_by_lobby(PENDING_LOBBY).await? else {
                    return Ok(
                        "No control room is waiting for a lobby. Run /setup control there first."
                            .to_owned(),
                    );
                };
                if !pending.is_link_admin(sender) {
                    return Ok(
                        "Only whoever set up the control room (or an authorized admin) can link a lobby."
                            .to_owned(),
                    );
                }
                self.store.attach_lobby(pending.id, group_id).await?;
                Ok("🔗 Lobby linked to the control room. Members who join will be announced there."
                    .to_owned())
            }
            _ => Ok("Usage: /setup control | /setup lobby".to_owned()),
        }
    }

    async fn cmd_unpair(&self, group_id: &str, sender: &str) -> AppResult<String> {
        let pair = match self.store.get_room_pair_by_control(group_id).await? {
            Some(p) => Some(p),
            None => self.store.get_room_pair_by_lobby(group_id).await?,
        };
        let Some(pair) = pair else {
            return Ok("This group is not paired.".to_owned());
        };
        if !pair.is_link_admin(sender) && !self.is_group_admin(group_id, sender).await {
            return Ok(NOT_ADMIN.to_owned());
        }
        self.store.delete_room_pair(pair.id).await?;
        Ok("🔌 Unpaired. Sessions are kept but nothing will be relayed.".to_owned())
    }

    async fn cmd_status(&self, group_id: &str, sender: &str) -> AppResult<String> {
        let Some(pair) = self.store.get_room_pair_by_control(group_id).await? else {
            return Ok(NOT_CONTROL.to_owned());
        };
        if !pair.is_link_admin(sender) && !self.is_group_admin(group_id, sender).await {
            return Ok(NOT_ADMIN.to_owned());
        }

        let stats = self.store.relay_stats().await?;
        let sessions = self.store.get_active_sessions_for_pair(pair.id).await?;
        let on_off = |b: bool| if b { "on" } else { "off" };
        Ok(format!(
            "📊 Status\n\
             Lobby linked: {}\n\
             Anonymous: {}\n\
             DM anonymous: {}\n\
             Confirmations: {}\n\
             Active sessions here: {}\n\
             Active sessions total: {}\n\
             Relays today: {}\n\
             Relays total: {}",
            if pair.lobby_group_id == PENDING_LOBBY { "no" } else { "yes" },
            on_off(pair.anonymous_mode),
            on_off(pair.dm_anonymous_mode),
            on_off(pair.send_confirmations),
            sessions.len(),
            stats.active_sessions,
            stats.relays_today,
            stats.total_relays,
        ))
    }

    async fn cmd_toggle(
        &self,
        group_id: &str,
        sender: &str,
        setting: Setting,
        arg: Option<&str>,
    ) -> AppResult<String> {
        let Some(pair) = self.store.get_room_pair_by_control(group_id).await? else {
            return Ok(NOT_CONTROL.to_owned());
        };
        if !pair.is_link_admin(sender) && !self.is_group_admin(group_id, sender).await {
            return Ok(NOT_ADMIN.to_owned());
        }
        let (label, usage) = match setting {
            Setting::Anonymous => ("Anonymous mode", "/anonymous on|off"),
            Setting::DmAnonymous => ("DM anonymous mode", "/dm-anonymous on|off"),
            Setting::Confirmations => ("Confirmations", "/confirmations on|off"),
        };
        let Some(enabled) = parse_toggle(arg) else {
            return Ok(format!("Usage: {usage}"));
        };
        match setting {
            Setting::Anonymous => self.store.set_anonymous_mode(pair.id, enabled).await?,
            Setting::DmAnonymous => self.store.set_dm_anonymous_mode(pair.id, enabled).await?,
            Setting::Confirmations => self.store.set_send_confirmations(pair.id, enabled).await?,
        }
        Ok(format!("{label} is now {}.", if enabled { "on" } else { "off" }))
    }

    async fn cmd_greeting(
        &self,
        group_id: &str,
        sender: &str,
        greeting: Option<&str>,
    ) -> AppResult<String> {
        let Some(pair) = self.store.get_room_pair_by_control(group_id).await? else {
            return Ok(NOT_CONTROL.to_owned());
        };
        if !pair.is_link_admin(sender) && !self.is_group_admin(group_id, sender).await {
            return Ok(NOT_ADMIN.to_owned());
        }
        self.store.set_greeting(pair.id, greeting).await?;
        Ok(match greeting {
            Some(_) => "Greeting updated. {name} is replaced with the member's display name."
                .to_owned(),
            None => "Greeting reset to the default.".to_owned(),
        })
    }

    async fn cmd_authorize(
        &self,
        group_id: &str,
        sender: &str,
        action: Option<&str>,
        subject: Option<&str>,
    ) -> AppResult<String> {
        let Some(pair) = self.store.get_room_pair_by_control(group_id).await? else {
            return Ok(NOT_CONTROL.to_owned());
        };
        // Authorization changes are restricted to the creator and existing
        // linking admins, never mere group admins.
        if !pair.is_link_admin(sender) {
            return Ok("Only the control room's creator or an authorized admin can do that.".to_owned());
        }

        match action {
            None | Some("list") => {
                let mut listed = vec![pair.created_by.as_str()];
                listed.extend(pair.admin_uuids());
                Ok(format!("Authorized: {}", listed.join(", ")))
            }
            Some("revoke") => {
                let Some(uuid) = subject else {
                    return Ok("Usage: /authorize revoke <uuid>".to_owned());
                };
                let remaining: Vec<&str> =
                    pair.admin_uuids().into_iter().filter(|a| *a != uuid).collect();
                if remaining.len() == pair.admin_uuids().len() {
                    return Ok(format!("{uuid} was not authorized."));
                }
                let csv = if remaining.is_empty() { None } else { Some(remaining.join(",")) };
                self.store.set_control_room_admins(pair.id, csv.as_deref()).await?;
                Ok(format!("Revoked {uuid}."))
            }
            Some(uuid) => {
                if pair.is_link_admin(uuid) {
                    return Ok(format!("{uuid} is already authorized."));
                }
                let mut admins: Vec<&str> = pair.admin_uuids();
                admins.push(uuid);
                self.store
                    .set_control_room_admins(pair.id, Some(&admins.join(",")))
                    .await?;
                Ok(format!("Authorized {uuid}."))
            }
        }
    }

    async fn is_group_admin(&self, group_id: &str, user_uuid: &str) -> bool {
        match self.gateway.group_admins(group_id).await {
            Ok(admins) => admins.iter().any(|a| a == user_uuid),
            Err(e) => {
                warn!("admin lookup failed: {e:#}");
                false
            }
        }
    }

    async fn say(&self, group_id: &str, text: &str) {
        if let Err(e) = self.gateway.send_group_message(text, group_id).await {
            warn!("command reply failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::gateway::mock::MockGateway;
    use crate::gateway::Member;
    use crate::relay::SessionManager;
    use crate::store::test_store;

    use super::*;

    const BOT: &str = "bot-uuid-000";
    const ADMIN: &str = "admin-uuid-111";
    const ALICE: &str = "alice-uuid-222";

    async fn test_bot() -> (Bot, SessionStore, Arc<MockGateway>) {
        let store = test_store().await;
        let gateway = Arc::new(MockGateway::new());
        let engine = RelayEngine::new(
            gateway.clone(),
            store.clone(),
            SessionManager::new(store.clone()),
            "Hello!".to_owned(),
        );
        let bot = Bot::new(gateway.clone(), store.clone(), engine, BOT.to_owned());
        (bot, store, gateway)
    }

    fn group_text(group_id: &str, sender: &str, text: &str) -> InboundMessage {
        InboundMessage {
            timestamp: 1_699_999_999_000,
            source_uuid: sender.to_owned(),
            group_id: Some(group_id.to_owned()),
            text: Some(text.to_owned()),
            ..Default::default()
        }
    }

    fn dm(sender: &str, number: &str, text: &str) -> InboundMessage {
        InboundMessage {
            timestamp: 1_699_999_999_000,
            source_uuid: sender.to_owned(),
            source_number: Some(number.to_owned()),
            source_name: Some("Alice".to_owned()),
            text: Some(text.to_owned()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn setup_control_then_lobby_links_pair() {
        let (bot, store, gateway) = test_bot().await;
        gateway.set_admin("control-1", ADMIN);
        gateway.set_admin("lobby-1", ADMIN);

        bot.handle_event(&group_text("control-1", ADMIN, "/setup control"))
            .await
            .unwrap();
        let pair = store.get_room_pair_by_control("control-1").await.unwrap().unwrap();
        assert_eq!(pair.lobby_group_id, PENDING_LOBBY);
        assert_eq!(pair.created_by, ADMIN);

        bot.handle_event(&group_text("lobby-1", ADMIN, "/setup lobby"))
            .await
            .unwrap();
        let pair = store.get_room_pair_by_control("control-1").await.unwrap().unwrap();
        assert_eq!(pair.lobby_group_id, "lobby-1");

        let replies = gateway.sent_messages();
        assert!(replies[0].text.contains("Control room registered"));
        assert!(replies[1].text.contains("Lobby linked"));
    }

    #[tokio::test]
    async fn setup_requires_group_admin() {
        let (bot, store, gateway) = test_bot().await;

        bot.handle_event(&group_text("control-1", ALICE, "/setup control"))
            .await
            .unwrap();
        assert!(store.get_room_pair_by_control("control-1").await.unwrap().is_none());
        assert!(gateway.sent_messages()[0].text.contains("group admins"));
    }

    #[tokio::test]
    async fn setup_lobby_requires_link_admin() {
        let (bot, store, gateway) = test_bot().await;
        store
            .create_room_pair(PENDING_LOBBY, "control-1", ADMIN, None, false)
            .await
            .unwrap();
        gateway.set_admin("lobby-1", ALICE);

        // A lobby group admin who did not create the control room may not
        // link it.
        bot.handle_event(&group_text("lobby-1", ALICE, "/setup lobby"))
            .await
            .unwrap();
        let pair = store.get_room_pair_by_control("control-1").await.unwrap().unwrap();
        assert_eq!(pair.lobby_group_id, PENDING_LOBBY);

        store
            .set_control_room_admins(pair.id, Some(ALICE))
            .await
            .unwrap();
        bot.handle_event(&group_text("lobby-1", ALICE, "/setup lobby"))
            .await
            .unwrap();
        let pair = store.get_room_pair_by_control("control-1").await.unwrap().unwrap();
        assert_eq!(pair.lobby_group_id, "lobby-1");
    }

    #[tokio::test]
    async fn unpair_removes_pairing() {
        let (bot, store, gateway) = test_bot().await;
        store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        bot.handle_event(&group_text("control-1", ADMIN, "/unpair")).await.unwrap();
        assert!(store.get_room_pair_by_control("control-1").await.unwrap().is_none());
        assert!(gateway.sent_messages()[0].text.contains("Unpaired"));
    }

    #[tokio::test]
    async fn status_reports_settings_and_counters() {
        let (bot, store, gateway) = test_bot().await;
        store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, true)
            .await
            .unwrap();

        bot.handle_event(&group_text("control-1", ADMIN, "/status")).await.unwrap();
        let reply = gateway.sent_messages()[0].text.clone();
        assert!(reply.contains("Lobby linked: yes"));
        assert!(reply.contains("Anonymous: on"));
        assert!(reply.contains("Relays total: 0"));
    }

    #[tokio::test]
    async fn toggles_update_pair_settings() {
        let (bot, store, gateway) = test_bot().await;
        let pair = store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        bot.handle_event(&group_text("control-1", ADMIN, "/anonymous on")).await.unwrap();
        bot.handle_event(&group_text("control-1", ADMIN, "/dm-anonymous on")).await.unwrap();
        bot.handle_event(&group_text("control-1", ADMIN, "/confirmations off"))
            .await
            .unwrap();

        let pair = store.get_room_pair_by_id(pair.id).await.unwrap().unwrap();
        assert!(pair.anonymous_mode);
        assert!(pair.dm_anonymous_mode);
        assert!(!pair.send_confirmations);

        bot.handle_event(&group_text("control-1", ADMIN, "/anonymous maybe"))
            .await
            .unwrap();
        assert!(gateway.sent_messages().last().unwrap().text.starts_with("Usage:"));
    }

    #[tokio::test]
    async fn greeting_set_and_reset() {
        let (bot, store, _gateway) = test_bot().await;
        let pair = store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        bot.handle_event(&group_text("control-1", ADMIN, "/greeting Hi {name}, read the rules!"))
            .await
            .unwrap();
        let got = store.get_room_pair_by_id(pair.id).await.unwrap().unwrap();
        assert_eq!(got.greeting_message.as_deref(), Some("Hi {name}, read the rules!"));

        bot.handle_event(&group_text("control-1", ADMIN, "/greeting")).await.unwrap();
        let got = store.get_room_pair_by_id(pair.id).await.unwrap().unwrap();
        assert!(got.greeting_message.is_none());
    }

    #[tokio::test]
    async fn authorize_grant_list_revoke() {
        let (bot, store, gateway) = test_bot().await;
        let pair = store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        bot.handle_event(&group_text("control-1", ADMIN, &format!("/authorize {ALICE}")))
            .await
            .unwrap();
        let got = store.get_room_pair_by_id(pair.id).await.unwrap().unwrap();
        assert!(got.is_link_admin(ALICE));

        bot.handle_event(&group_text("control-1", ADMIN, "/authorize list")).await.unwrap();
        let listing = gateway.sent_messages().last().unwrap().text.clone();
        assert!(listing.contains(ADMIN));
        assert!(listing.contains(ALICE));

        bot.handle_event(&group_text("control-1", ADMIN, &format!("/authorize revoke {ALICE}")))
            .await
            .unwrap();
        let got = store.get_room_pair_by_id(pair.id).await.unwrap().unwrap();
        assert!(!got.is_link_admin(ALICE));

        // A mere group admin cannot touch authorization.
        gateway.set_admin("control-1", ALICE);
        bot.handle_event(&group_text("control-1", ALICE, "/authorize some-uuid"))
            .await
            .unwrap();
        let got = store.get_room_pair_by_id(pair.id).await.unwrap().unwrap();
        assert!(!got.is_link_admin("some-uuid"));
    }

    #[tokio::test]
    async fn membership_events_reach_the_engine() {
        let (bot, store, _gateway) = test_bot().await;
        let pair = store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        let mut event = group_text("lobby-1", ADMIN, "");
        event.text = None;
        event.added_members = vec![Member { uuid: ALICE.to_owned(), number: None }];
        bot.handle_event(&event).await.unwrap();
        assert!(store.get_active_session(pair.id, ALICE).await.unwrap().is_some());

        let mut event = group_text("lobby-1", ADMIN, "");
        event.text = None;
        event.removed_members = vec![Member { uuid: ALICE.to_owned(), number: None }];
        bot.handle_event(&event).await.unwrap();
        assert!(store.get_active_session(pair.id, ALICE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dm_and_control_reply_round_trip() {
        let (bot, store, gateway) = test_bot().await;
        store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        let mut join = group_text("lobby-1", ADMIN, "");
        join.text = None;
        join.added_members = vec![Member {
            uuid: ALICE.to_owned(),
            number: Some("+15551234567".to_owned()),
        }];
        bot.handle_event(&join).await.unwrap();

        bot.handle_event(&dm(ALICE, "+15551234567", "anyone around?")).await.unwrap();
        let forward = gateway.sent_to_group("control-1").last().unwrap().clone();
        assert!(forward.text.contains("anyone around?"));

        let mut reply = group_text("control-1", ADMIN, "sure, what's up?");
        reply.quoted_timestamp = Some(forward.timestamp);
        bot.handle_event(&reply).await.unwrap();
        let delivered = gateway.sent_to_recipient("+15551234567");
        assert_eq!(delivered.last().unwrap().text, "sure, what's up?");
    }

    #[tokio::test]
    async fn lobby_chatter_is_not_relayed() {
        let (bot, store, gateway) = test_bot().await;
        store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        let mut chatter = group_text("lobby-1", ALICE, "hello everyone");
        chatter.quoted_timestamp = Some(12345);
        bot.handle_event(&chatter).await.unwrap();
        assert!(gateway.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn dm_slash_help_answers_directly() {
        let (bot, store, gateway) = test_bot().await;
        store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        bot.handle_event(&dm(ALICE, "+15551234567", "/help")).await.unwrap();
        let sent = gateway.sent_to_recipient("+15551234567");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("/setup control"));
        // Nothing was forwarded to the control room.
        assert!(gateway.sent_to_group("control-1").is_empty());
    }

    #[tokio::test]
    async fn dm_command_opens_private_channel() {
        let (bot, store, gateway) = test_bot().await;
        store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        let mut event = group_text("lobby-1", ALICE, "/dm");
        event.source_number = Some("+15559998888".to_owned());
        bot.handle_event(&event).await.unwrap();
        let sent = gateway.sent_to_recipient("+15559998888");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Private channel open"));
    }

    #[tokio::test]
    async fn unknown_command_points_at_help() {
        let (bot, store, gateway) = test_bot().await;
        store
            .create_room_pair("lobby-1", "control-1", ADMIN, None, false)
            .await
            .unwrap();

        bot.handle_event(&group_text("control-1", ADMIN, "/frobnicate")).await.unwrap();
        assert!(gateway.sent_messages()[0].text.contains("/help"));
    }
}
