pub mod signal;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;

use crate::AppResult;

/// Contact details the transport knows about a user.
#[derive(Debug, Clone, Default)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub number: Option<String>,
}

/// Where a reaction should be delivered.
#[derive(Debug, Clone)]
pub enum ReactionTarget {
    Direct(String),
    Group(String),
}

/// Member entry from a group membership change.
#[derive(Debug, Clone)]
pub struct Member {
    pub uuid: String,
    pub number: Option<String>,
}

/// One inbound envelope, flattened: a DM, a group message, a membership
/// change, or any mix the transport delivers together.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub timestamp: i64,
    pub source_uuid: String,
    pub source_number: Option<String>,
    pub source_name: Option<String>,
    pub group_id: Option<String>,
    pub text: Option<String>,
    pub quoted_timestamp: Option<i64>,
    pub added_members: Vec<Member>,
    pub removed_members: Vec<Member>,
}

/// Send/lookup primitives of the messaging transport. Sends return the
/// timestamp the message was posted with, which doubles as the correlation
/// key for threaded replies.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_direct_message(&self, text: &str, recipient: &str) -> AppResult<i64>;

    async fn send_group_message(&self, text: &str, group_id: &str) -> AppResult<i64>;

    async fn send_reaction(
        &self,
        emoji: &str,
        target_author: &str,
        target_timestamp: i64,
        target: ReactionTarget,
    ) -> AppResult<()>;

    async fn contact_info(&self, user_uuid: &str) -> AppResult<Option<ContactInfo>>;

    async fn group_name(&self, group_id: &str) -> AppResult<Option<String>>;

    async fn group_admins(&self, group_id: &str) -> AppResult<Vec<String>>;
}
