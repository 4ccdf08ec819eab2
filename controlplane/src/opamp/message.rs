use fleet_common::model::{AgentHealth, Attributes, RemoteConfigStatus};

/// Domain-level mirror of the `AgentToServer` fields this system reads
/// (§6). Wire (de)serialization lives in `opamp::wire`; everything else
/// operates on this so the session-core logic is testable without a
/// protobuf codec in the loop.
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub instance_uid: Vec<u8>,
    pub sequence_num: u64,
    pub agent_description: Option<AgentDescriptionMsg>,
    pub capabilities: u64,
    pub health: Option<AgentHealth>,
    pub effective_config: Option<EffectiveConfigMsg>,
    pub remote_config_status: Option<RemoteConfigStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct AgentDescriptionMsg {
    pub identifying_attributes: Attributes,
    pub non_identifying_attributes: Attributes,
}

impl AgentDescriptionMsg {
    /// The canonical binding between wire-level instance-uid and the
    /// persistent agent id (§6).
    pub const AGENT_ID_KEY: &'static str = "otelfleet.agent.id";

    pub fn agent_id(&self) -> Option<&str> {
        self.identifying_attributes
            .get(Self::AGENT_ID_KEY)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EffectiveConfigMsg {
    pub files: std::collections::BTreeMap<String, Vec<u8>>,
}

/// Bit flags for `ServerToAgent.flags`.
pub const FLAG_REPORT_FULL_STATE: u64 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponseType {
    BadRequest,
    Unavailable,
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub instance_uid: Vec<u8>,
    pub flags: u64,
    pub remote_config: Option<RemoteConfigFrame>,
    pub error_response: Option<(ErrorResponseType, String)>,
}

#[derive(Debug, Clone)]
pub struct RemoteConfigFrame {
    pub config: fleet_common::hash::AgentConfigMap,
    pub config_hash: Vec<u8>,
}

impl OutgoingMessage {
    pub fn echo(instance_uid: Vec<u8>) -> Self {
        Self {
            instance_uid,
            ..Default::default()
        }
    }

    pub fn error(instance_uid: Vec<u8>, kind: ErrorResponseType, message: impl Into<String>) -> Self {
        Self {
            instance_uid,
            error_response: Some((kind, message.into())),
            ..Default::default()
        }
    }
}
