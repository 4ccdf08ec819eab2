use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// Flat string attribute map. Ordered so label matching and logging are
/// deterministic; OpAMP only ever sends string-valued identifying and
/// non-identifying attributes in this system's scope.
pub type Attributes = BTreeMap<String, String>;

/// Immutable identity, written once at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistry {
    pub id: AgentId,
    pub friendly_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAttributes {
    pub identifying: Attributes,
    pub non_identifying: Attributes,
}

impl AgentAttributes {
    /// Identifying and non-identifying attributes flattened into one map,
    /// as required by label matching (§4.10). Identifying attributes win on
    /// key collision.
    pub fn flattened(&self) -> Attributes {
        let mut flat = self.non_identifying.clone();
        flat.extend(self.identifying.clone());
        flat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityState {
    Unknown,
    Connected,
    Disconnected,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        ConnectivityState::Unknown
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub state: ConnectivityState,
    pub last_seen: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub instance_uid: Vec<u8>,
    pub capabilities: u64,
    pub sequence_num: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub healthy: bool,
    pub start_time_unix_nano: u64,
    pub last_error: String,
}

/// As last reported by the agent over an `AgentToServer.effective_config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    /// Filename -> raw body, mirrors `opamp_client::opamp::proto::AgentConfigFile`
    /// minus `content_type` (not needed once persisted).
    pub files: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteConfigApplyStatus {
    Unset,
    Applying,
    Applied,
    Failed,
}

impl Default for RemoteConfigApplyStatus {
    fn default() -> Self {
        RemoteConfigApplyStatus::Unset
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfigStatus {
    pub last_remote_config_hash: Vec<u8>,
    pub status: RemoteConfigApplyStatus,
    pub error_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSyncStatus {
    Unknown,
    InSync,
    OutOfSync,
    Applying,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub health: Option<AgentHealth>,
    pub effective_config: Option<EffectiveConfig>,
    pub remote_config_status: Option<RemoteConfigStatus>,
    pub config_sync_status: Option<ConfigSyncStatus>,
    pub config_sync_reason: String,
}

/// The full aggregate, assembled on read from six independent stores (§4.3).
/// Never persisted as a single record: each field is written by whichever
/// store owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub friendly_name: String,
    pub attributes: AgentAttributes,
    pub connection: ConnectionState,
    pub status: RuntimeStatus,
}
