//! Conversion between the `opamp_client::opamp::proto` wire types and this
//! crate's domain-level `IncomingMessage`/`OutgoingMessage` (§6). Isolated
//! here so the session-core logic in `session.rs` never touches protobuf
//! directly.
use std::collections::BTreeMap;

use fleet_common::model::{AgentHealth, RemoteConfigApplyStatus, RemoteConfigStatus};
use opamp_client::opamp::proto::{
    AgentConfigFile as ProtoAgentConfigFile, AgentConfigMap as ProtoAgentConfigMap,
    AgentRemoteConfig, AgentToServer, RemoteConfigStatuses, ServerErrorResponse,
    ServerErrorResponseType, ServerToAgent,
};
use prost::Message;

use super::message::{
    AgentDescriptionMsg, EffectiveConfigMsg, ErrorResponseType, IncomingMessage, OutgoingMessage,
};

pub fn decode_incoming(bytes: &[u8]) -> Result<IncomingMessage, prost::DecodeError> {
    let proto = AgentToServer::decode(bytes)?;

    let agent_description = proto.agent_description.map(|d| AgentDescriptionMsg {
        identifying_attributes: flatten_key_values(&d.identifying_attributes),
        non_identifying_attributes: flatten_key_values(&d.non_identifying_attributes),
    });

    let health = proto.health.map(|h| AgentHealth {
        healthy: h.healthy,
        start_time_unix_nano: h.start_time_unix_nano,
        last_error: h.last_error,
    });

    let effective_config = proto.effective_config.and_then(|c| c.config_map).map(|m| EffectiveConfigMsg {
        files: m
            .config_map
            .into_iter()
            .map(|(name, file)| (name, file.body))
            .collect(),
    });

    let remote_config_status = proto.remote_config_status.map(|s| RemoteConfigStatus {
        last_remote_config_hash: s.last_remote_config_hash,
        status: match RemoteConfigStatuses::try_from(s.status).unwrap_or(RemoteConfigStatuses::Unset) {
            RemoteConfigStatuses::Unset => RemoteConfigApplyStatus::Unset,
            RemoteConfigStatuses::Applying => RemoteConfigApplyStatus::Applying,
            RemoteConfigStatuses::Applied => RemoteConfigApplyStatus::Applied,
            RemoteConfigStatuses::Failed => RemoteConfigApplyStatus::Failed,
        },
        error_message: s.error_message,
    });

    Ok(IncomingMessage {
        instance_uid: proto.instance_uid,
        sequence_num: proto.sequence_num,
        agent_description,
        capabilities: proto.capabilities,
        health,
        effective_config,
        remote_config_status,
    })
}

fn flatten_key_values(pairs: &[opamp_client::opamp::proto::KeyValue]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .filter_map(|kv| {
            let value = kv.value.as_ref()?.value.as_ref()?;
            let opamp_client::opamp::proto::any_value::Value::StringValue(s) = value else {
                return None;
            };
            Some((kv.key.clone(), s.clone()))
        })
        .collect()
}

pub fn encode_outgoing(msg: OutgoingMessage) -> Vec<u8> {
    const REPORT_FULL_STATE: u32 = 0x1;

    let remote_config = msg.remote_config.map(|frame| AgentRemoteConfig {
        config: Some(ProtoAgentConfigMap {
            config_map: frame
                .config
                .files
                .into_iter()
                .map(|(name, file)| {
                    (
                        name,
                        ProtoAgentConfigFile {
                            body: file.body,
                            content_type: file.content_type,
                        },
                    )
                })
                .collect(),
        }),
        config_hash: frame.config_hash,
    });

    let error_response = msg.error_response.map(|(kind, message)| ServerErrorResponse {
        r#type: match kind {
            ErrorResponseType::BadRequest => ServerErrorResponseType::BadRequest as i32,
            ErrorResponseType::Unavailable => ServerErrorResponseType::Unavailable as i32,
        },
        error_message: message,
        ..Default::default()
    });

    let proto = ServerToAgent {
        instance_uid: msg.instance_uid,
        flags: if msg.flags & super::message::FLAG_REPORT_FULL_STATE != 0 {
            REPORT_FULL_STATE as u64
        } else {
            0
        },
        remote_config,
        error_response,
        ..Default::default()
    };
    proto.encode_to_vec()
}
