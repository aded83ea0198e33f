//! In-memory gateway double for engine and dispatcher tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::AppResult;

use super::{ContactInfo, Gateway, ReactionTarget};

#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub text: String,
    pub group_id: Option<String>,
    pub recipient: Option<String>,
    pub timestamp: i64,
}

#[derive(Default)]
pub(crate) struct MockGateway {
    pub sent: Mutex<Vec<Sent>>,
    pub reactions: Mutex<Vec<(String, ReactionTarget)>>,
    pub contacts: Mutex<HashMap<String, ContactInfo>>,
    pub group_names: Mutex<HashMap<String, String>>,
    pub admins: Mutex<HashMap<String, Vec<String>>>,
    pub fail_group_sends: AtomicBool,
    pub fail_direct_sends: AtomicBool,
    next_timestamp: AtomicI64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            next_timestamp: AtomicI64::new(1_700_000_000_000),
            ..Self::default()
        }
    }

    pub fn sent_messages(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to_group(&self, group_id: &str) -> Vec<Sent> {
        self.sent_messages()
            .into_iter()
            .filter(|s| s.group_id.as_deref() == Some(group_id))
            .collect()
    }

    pub fn sent_to_recipient(&self, recipient: &str) -> Vec<Sent> {
        self.sent_messages()
            .into_iter()
            .filter(|s| s.recipient.as_deref() == Some(recipient))
            .collect()
    }

    pub fn set_group_name(&self, group_id: &str, name: &str) {
        self.group_names
            .lock()
            .unwrap()
            .insert(group_id.to_owned(), name.to_owned());
    }

    pub fn set_admin(&self, group_id: &str, uuid: &str) {
        self.admins
            .lock()
            .unwrap()
            .entry(group_id.to_owned())
            .or_default()
            .push(uuid.to_owned());
    }

    pub fn set_contact(&self, uuid: &str, name: Option<&str>, number: Option<&str>) {
        self.contacts.lock().unwrap().insert(
            uuid.to_owned(),
            ContactInfo {
                name: name.map(str::to_owned),
                number: number.map(str::to_owned),
            },
        );
    }

    fn record(&self, text: &str, group_id: Option<&str>, recipient: Option<&str>) -> i64 {
        let timestamp = self.next_timestamp.fetch_add(1, Ordering::Relaxed);
        self.sent.lock().unwrap().push(Sent {
            text: text.to_owned(),
            group_id: group_id.map(str::to_owned),
            recipient: recipient.map(str::to_owned),
            timestamp,
        });
        timestamp
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn send_direct_message(&self, text: &str, recipient: &str) -> AppResult<i64> {
        if self.fail_direct_sends.load(Ordering::Relaxed) {
            anyhow::bail!("direct send failed");
        }
        Ok(self.record(text, None, Some(recipient)))
    }

    async fn send_group_message(&self, text: &str, group_id: &str) -> AppResult<i64> {
        if self.fail_group_sends.load(Ordering::Relaxed) {
            anyhow::bail!("group send failed");
        }
        Ok(self.record(text, Some(group_id), None))
    }

    async fn send_reaction(
        &self,
        emoji: &str,
        _target_author: &str,
        _target_timestamp: i64,
        target: ReactionTarget,
    ) -> AppResult<()> {
        self.reactions.lock().unwrap().push((emoji.to_owned(), target));
        Ok(())
    }

    async fn contact_info(&self, user_uuid: &str) -> AppResult<Option<ContactInfo>> {
        Ok(self.contacts.lock().unwrap().get(user_uuid).cloned())
    }

    async fn group_name(&self, group_id: &str) -> AppResult<Option<String>> {
        Ok(self.group_names.lock().unwrap().get(group_id).cloned())
    }

    async fn group_admins(&self, group_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .admins
            .lock()
            .unwrap()
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }
}
