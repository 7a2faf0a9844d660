//! Case file and mock server configuration.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use super::payload::MAX_MESSAGE_SIZE;
use crate::config::expand_tilde;

/// The ten gateway actions a case can exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    QueryQueueRoute,
    SendMessage,
    BatchSendMessage,
    ReceiveMessage,
    BatchReceiveMessage,
    DeleteMessage,
    BatchDeleteMessage,
    QueryTopicRoute,
    PublishMessage,
    BatchPublishMessage,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::QueryQueueRoute,
        Action::SendMessage,
        Action::BatchSendMessage,
        Action::ReceiveMessage,
        Action::BatchReceiveMessage,
        Action::DeleteMessage,
        Action::BatchDeleteMessage,
        Action::QueryTopicRoute,
        Action::PublishMessage,
        Action::BatchPublishMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::QueryQueueRoute => "QueryQueueRoute",
            Action::SendMessage => "SendMessage",
            Action::BatchSendMessage => "BatchSendMessage",
            Action::ReceiveMessage => "ReceiveMessage",
            Action::BatchReceiveMessage => "BatchReceiveMessage",
            Action::DeleteMessage => "DeleteMessage",
            Action::BatchDeleteMessage => "BatchDeleteMessage",
            Action::QueryTopicRoute => "QueryTopicRoute",
            Action::PublishMessage => "PublishMessage",
            Action::BatchPublishMessage => "BatchPublishMessage",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("invalid action in case: {}", s))
    }
}

/// One entry of the case file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Case {
    pub description: String,
    #[serde(rename = "CaseEnabled")]
    pub enabled: bool,
    /// Number of iterations, ignored when `repeat_timeout` > 0
    pub repeat_times: i64,
    /// Run for this many seconds
    pub repeat_timeout: i64,
    /// Maximum in-flight requests
    pub concurrent: i64,
    /// 0 means unlimited
    #[serde(rename = "MaximumTPS")]
    pub maximum_tps: i64,
    /// "queue" or "topic", informational
    pub resource_type: String,
    /// Full name, or the prefix when `resource_count` > 1
    pub resource_name: String,
    pub resource_count: i64,
    pub resource_start_idx: i64,
    /// Message sizes drawn from 1..=message_size
    pub rand_msg_size: bool,
    pub message_size: i64,
    /// Messages per batch request
    pub message_count: i64,
    pub action: String,
    /// Stop the clock before the acknowledgement
    pub alone_recv_time: bool,
    /// Delete what a receive returned
    pub ack_enabled: bool,
    pub receipt_handles: Vec<String>,
    pub delay_seconds: i64,
    pub polling_wait_seconds: i64,
    pub routing_key: String,
    pub tags: Vec<String>,
}

impl Case {
    /// Check the case can run and resolve its action
    pub fn validate(&self) -> anyhow::Result<Action> {
        if self.repeat_times < 0 && self.repeat_timeout < 0 {
            bail!(
                "invalid case repeat times: {}, repeat timeout: {}s",
                self.repeat_times,
                self.repeat_timeout
            );
        }
        if self.concurrent < 1 {
            bail!("invalid case concurrent: {}", self.concurrent);
        }
        if self.resource_count < 1 {
            bail!("invalid case resource count: {}", self.resource_count);
        }
        if self.message_size < 0 || self.message_size > MAX_MESSAGE_SIZE as i64 {
            bail!(
                "invalid case message size: {}, expect 0~{}",
                self.message_size,
                MAX_MESSAGE_SIZE
            );
        }
        if self.message_count < 0 {
            bail!("invalid case message count: {}", self.message_count);
        }
        if self.delay_seconds < 0 || self.polling_wait_seconds < 0 {
            bail!(
                "invalid case delay seconds: {}, polling wait seconds: {}",
                self.delay_seconds,
                self.polling_wait_seconds
            );
        }
        self.action.parse::<Action>().map_err(anyhow::Error::msg)
    }

    /// Resource name for the `idx`-th resource of an iteration
    pub fn resource(&self, idx: i64) -> String {
        if self.resource_count > 1 {
            format!("{}{}", self.resource_name, idx + self.resource_start_idx)
        } else {
            self.resource_name.clone()
        }
    }
}

/// Read a JSON array of cases
pub fn load_cases(path: &str) -> anyhow::Result<Vec<Case>> {
    let path = expand_tilde(path);
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("read case file {}", path.display()))?;
    let cases: Vec<Case> = serde_json::from_str(&data)
        .with_context(|| format!("unmarshal case file {}", path.display()))?;
    if cases.is_empty() {
        bail!("no case found in case file {}", path.display());
    }
    Ok(cases)
}

/// Configuration for the mock CMQ gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockServerConfig {
    /// Port to listen on (0 for random)
    pub port: u16,
    /// Simulated latency per request in milliseconds
    pub latency_ms: u64,
    /// Error rate (0.0 to 1.0)
    pub error_rate: f64,
    /// Verify request signatures with this key when set
    pub secret_key: Option<String>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            latency_ms: 0,
            error_rate: 0.0,
            secret_key: None,
        }
    }
}
