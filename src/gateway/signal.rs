//! signal-cli daemon client: JSON-RPC for sending, SSE for receiving.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{now_millis, AppResult};

use super::{ContactInfo, Gateway, InboundMessage, Member, ReactionTarget};

pub struct SignalRpcClient {
    http: reqwest::Client,
    rpc_url: String,
    events_url: String,
    account: String,
    next_id: AtomicU64,
}

impl SignalRpcClient {
    pub fn new(host: &str, port: u16, account: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: format!("http://{host}:{port}/api/v1/rpc"),
            events_url: format!("http://{host}:{port}/api/v1/events"),
            account: account.to_owned(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc(&self, method: &str, mut params: Value) -> AppResult<Value> {
        params["account"] = Value::from(self.account.as_str());
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let body: Value = self
            .http
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = body.get("error") {
            anyhow::bail!("rpc {method} failed: {err}");
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn list_groups(&self) -> AppResult<Vec<Value>> {
        let result = self.rpc("listGroups", json!({})).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    async fn find_group(&self, group_id: &str) -> AppResult<Option<Value>> {
        let groups = self.list_groups().await?;
        Ok(groups
            .into_iter()
            .find(|g| g.get("id").and_then(Value::as_str) == Some(group_id)))
    }

    /// The bot's own uuid, resolved from group membership by phone number.
    pub async fn own_uuid(&self) -> AppResult<Option<String>> {
        for group in self.list_groups().await? {
            for member in group.get("members").and_then(Value::as_array).into_iter().flatten() {
                if member.get("number").and_then(Value::as_str) == Some(self.account.as_str()) {
                    if let Some(uuid) = member.get("uuid").and_then(Value::as_str) {
                        return Ok(Some(uuid.to_owned()));
                    }
                }
            }
        }

        warn!("own uuid not found in group membership, trying getUserStatus");
        let result = self
            .rpc("getUserStatus", json!({ "recipient": [self.account] }))
            .await?;
        for user in result.as_array().into_iter().flatten() {
            if user.get("number").and_then(Value::as_str) == Some(self.account.as_str()) {
                return Ok(user.get("uuid").and_then(Value::as_str).map(str::to_owned));
            }
        }
        Ok(None)
    }

    /// Open the SSE event stream.
    pub async fn subscribe(&self) -> AppResult<EventStream> {
        info!(url = %self.events_url, "connecting to signal event stream");
        let response = self
            .http
            .get(&self.events_url)
            .send()
            .await?
            .error_for_status()?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(EventStream { chunks, buf: String::new() })
    }
}

#[async_trait]
impl Gateway for SignalRpcClient {
    async fn send_direct_message(&self, text: &str, recipient: &str) -> AppResult<i64> {
        let result = self
            .rpc("send", json!({ "message": text, "recipient": [recipient] }))
            .await?;
        debug!("direct message sent");
        Ok(result
            .get("timestamp")
            .and_then(Value::as_i64)
            .unwrap_or_else(now_millis))
    }

    async fn send_group_message(&self, text: &str, group_id: &str) -> AppResult<i64> {
        let result = self
            .rpc("send", json!({ "message": text, "groupId": group_id }))
            .await?;
        debug!("group message sent");
        Ok(result
            .get("timestamp")
            .and_then(Value::as_i64)
            .unwrap_or_else(now_millis))
    }

    async fn send_reaction(
        &self,
        emoji: &str,
        target_author: &str,
        target_timestamp: i64,
        target: ReactionTarget,
    ) -> AppResult<()> {
        let mut params = json!({
            "emoji": emoji,
            "targetAuthor": target_author,
            "targetTimestamp": target_timestamp,
        });
        match target {
            ReactionTarget::Direct(recipient) => params["recipient"] = json!([recipient]),
            ReactionTarget::Group(group_id) => params["groupId"] = Value::from(group_id),
        }
        self.rpc("sendReaction", params).await?;
        Ok(())
    }

    async fn contact_info(&self, user_uuid: &str) -> AppResult<Option<ContactInfo>> {
        let result = self
            .rpc("listContacts", json!({ "recipient": [user_uuid] }))
            .await?;
        let Some(contact) = result.as_array().and_then(|c| c.first()) else {
            return Ok(None);
        };
        Ok(Some(ContactInfo {
            name: contact
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .map(str::to_owned),
            number: contact.get("number").and_then(Value::as_str).map(str::to_owned),
        }))
    }

    async fn group_name(&self, group_id: &str) -> AppResult<Option<String>> {
        Ok(self
            .find_group(group_id)
            .await?
            .and_then(|g| g.get("name").and_then(Value::as_str).map(str::to_owned)))
    }

    async fn group_admins(&self, group_id: &str) -> AppResult<Vec<String>> {
        let Some(group) = self.find_group(group_id).await? else {
            return Ok(Vec::new());
        };
        Ok(group
            .get("admins")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|m| m.get("uuid").and_then(Value::as_str).map(str::to_owned))
            .collect())
    }
}

/// Incremental SSE frame reader over the daemon's event endpoint.
pub struct EventStream {
    chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buf: String,
}

impl EventStream {
    /// Next parseable inbound message; `None` when the stream closes.
    pub async fn next_event(&mut self) -> AppResult<Option<InboundMessage>> {
        loop {
            if let Some(pos) = self.buf.find("\n\n") {
                let frame: String = self.buf.drain(..pos + 2).collect();
                for line in frame.lines() {
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    match serde_json::from_str::<Value>(data.trim()) {
                        Ok(value) => {
                            if let Some(msg) = parse_event(&value) {
                                return Ok(Some(msg));
                            }
                        }
                        Err(e) => warn!("undecodable sse event: {e}"),
                    }
                }
                continue;
            }

            match self.chunks.next().await {
                Some(chunk) => self.buf.push_str(&String::from_utf8_lossy(&chunk?)),
                None => return Ok(None),
            }
        }
    }
}

/// Flatten a signal-cli envelope into an [`InboundMessage`]. Envelopes
/// without a data message (receipts, typing indicators) and malformed
/// source uuids are dropped.
fn parse_event(data: &Value) -> Option<InboundMessage> {
    let envelope = data.get("envelope").unwrap_or(data);

    let source_uuid = envelope
        .get("sourceUuid")
        .and_then(Value::as_str)
        .or_else(|| envelope.get("source").and_then(Value::as_str))?;
    Uuid::parse_str(source_uuid).ok()?;

    let data_message = envelope.get("dataMessage")?;
    let group_info = data_message.get("groupInfo");

    let members = |key: &str| -> Vec<Member> {
        group_info
            .and_then(|g| g.get(key))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|m| {
                Some(Member {
                    uuid: m.get("uuid").and_then(Value::as_str)?.to_owned(),
                    number: m.get("number").and_then(Value::as_str).map(str::to_owned),
                })
            })
            .collect()
    };

    Some(InboundMessage {
        timestamp: envelope.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
        source_uuid: source_uuid.to_owned(),
        source_number: envelope
            .get("sourceNumber")
            .and_then(Value::as_str)
            .map(str::to_owned),
        source_name: envelope
            .get("sourceName")
            .and_then(Value::as_str)
            .map(str::to_owned),
        group_id: group_info
            .and_then(|g| g.get("groupId"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        text: data_message
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned),
        quoted_timestamp: data_message
            .get("quote")
            .and_then(|q| q.get("id").or_else(|| q.get("timestamp")))
            .and_then(Value::as_i64),
        added_members: members("addedMembers"),
        removed_members: members("removedMembers"),
    })
}
