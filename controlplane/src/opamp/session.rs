use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use fleet_common::{
    ids::AgentId,
    model::{AgentAttributes, ConnectionState, ConnectivityState, EffectiveConfig},
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use super::message::{
    AgentDescriptionMsg, ErrorResponseType, FLAG_REPORT_FULL_STATE, IncomingMessage, OutgoingMessage,
    RemoteConfigFrame,
};
use crate::{
    repository::AgentRepository,
    services::assignment::{AssignmentService, ConfigChangeNotifier},
};

/// Per-process connection state (§4.12): `agent_id -> live connection` and
/// `peer_key -> agent_id` for reverse lookup within one session. `DashMap`
/// gives the read/write-locked-map semantics required by §5 without a
/// separate `RwLock`.
pub struct SessionCore {
    repository: Arc<AgentRepository>,
    assigner: Arc<AssignmentService>,
    connections: DashMap<AgentId, UnboundedSender<OutgoingMessage>>,
    peer_to_agent: DashMap<String, AgentId>,
}

impl SessionCore {
    pub fn new(repository: Arc<AgentRepository>, assigner: Arc<AssignmentService>) -> Self {
        Self {
            repository,
            assigner,
            connections: DashMap::new(),
            peer_to_agent: DashMap::new(),
        }
    }

    pub fn on_connected(&self, peer_key: &str) {
        info!(peer = peer_key, "agent connection established");
    }

    pub fn register_connection(&self, agent_id: &AgentId, sender: UnboundedSender<OutgoingMessage>) {
        self.connections.insert(agent_id.clone(), sender);
    }

    /// Registers (or refreshes) the live-connection entry for whichever
    /// agent id this peer has most recently resolved to. Cheap to call
    /// after every inbound message; a no-op before the peer has sent an
    /// `agent_description`.
    pub fn refresh_connection(&self, peer_key: &str, sender: &UnboundedSender<OutgoingMessage>) {
        if let Some(agent_id) = self.peer_to_agent.get(peer_key) {
            self.connections.insert(agent_id.clone(), sender.clone());
        }
    }

    pub fn on_read_message_error(&self, peer_key: &str, error: &str) {
        warn!(peer = peer_key, error, "error reading OpAMP message");
    }

    /// `OnMessage` (§4.12 steps 1-6).
    pub fn on_message(&self, peer_key: &str, msg: IncomingMessage) -> OutgoingMessage {
        let agent_id = match self.resolve_agent_id(peer_key, &msg) {
            Some(id) => id,
            None => return OutgoingMessage::echo(msg.instance_uid),
        };

        match self.repository.exists(&agent_id) {
            Ok(false) => {
                return OutgoingMessage::error(
                    msg.instance_uid,
                    ErrorResponseType::BadRequest,
                    "agent not registered",
                );
            }
            Err(e) => {
                warn!(%agent_id, error = %e, "storage error checking agent registration");
                return OutgoingMessage::error(msg.instance_uid, ErrorResponseType::Unavailable, e.to_string());
            }
            Ok(true) => {}
        }

        let needs_full_state = match self.update_connection_state(&agent_id, &msg) {
            Ok(flag) => flag,
            Err(e) => {
                return OutgoingMessage::error(msg.instance_uid, ErrorResponseType::Unavailable, e.to_string());
            }
        };

        if let Some(remote_status) = &msg.remote_config_status {
            if let Err(e) = self.reconcile_remote_status(&agent_id, remote_status) {
                return OutgoingMessage::error(msg.instance_uid, ErrorResponseType::Unavailable, e.to_string());
            }
        }

        if let Some(description) = &msg.agent_description {
            if let Err(e) = self.repository.update_attributes(
                &agent_id,
                &AgentAttributes {
                    identifying: description.identifying_attributes.clone(),
                    non_identifying: description.non_identifying_attributes.clone(),
                },
            ) {
                return OutgoingMessage::error(msg.instance_uid, ErrorResponseType::Unavailable, e.to_string());
            }
        }
        if let Some(health) = &msg.health {
            if let Err(e) = self.repository.update_health(&agent_id, health) {
                return OutgoingMessage::error(msg.instance_uid, ErrorResponseType::Unavailable, e.to_string());
            }
        }
        if let Some(effective) = &msg.effective_config {
            let record = EffectiveConfig {
                files: effective.files.clone(),
            };
            if let Err(e) = self.repository.update_effective_config(&agent_id, &record) {
                return OutgoingMessage::error(msg.instance_uid, ErrorResponseType::Unavailable, e.to_string());
            }
        }

        OutgoingMessage {
            instance_uid: msg.instance_uid,
            flags: if needs_full_state { FLAG_REPORT_FULL_STATE } else { 0 },
            remote_config: None,
            error_response: None,
        }
    }

    /// Step 1: resolve agent id from `agent_description`'s identifying
    /// attributes, falling back to the cached peer mapping.
    fn resolve_agent_id(&self, peer_key: &str, msg: &IncomingMessage) -> Option<AgentId> {
        if let Some(description) = &msg.agent_description {
            if let Some(id) = description.agent_id() {
                let agent_id = AgentId::from(id);
                self.peer_to_agent.insert(peer_key.to_owned(), agent_id.clone());
                return Some(agent_id);
            }
        }
        self.peer_to_agent.get(peer_key).map(|entry| entry.clone())
    }

    /// Step 3: update connection state and detect the need for a full-state
    /// request. Returns whether `ReportFullState` should be set.
    fn update_connection_state(
        &self,
        agent_id: &AgentId,
        msg: &IncomingMessage,
    ) -> Result<bool, fleet_common::error::DatabaseError> {
        let now = Utc::now();
        let existing = self.repository.get_connection_state(agent_id).ok();

        let needs_full_state = match &existing {
            None => msg.sequence_num != 0,
            Some(state) if state.instance_uid != msg.instance_uid => true,
            Some(state) => msg.sequence_num > 0 && msg.sequence_num != state.sequence_num + 1,
        };

        let mut next = existing.unwrap_or_default();
        if next.instance_uid != msg.instance_uid {
            next.instance_uid = msg.instance_uid.clone();
            next.connected_at = Some(now);
            next.sequence_num = 0;
        }
        next.last_seen = Some(now);
        next.state = ConnectivityState::Connected;
        if msg.capabilities != 0 {
            next.capabilities = msg.capabilities;
        }
        next.sequence_num = msg.sequence_num;

        self.repository.update_connection_state(agent_id, &next)?;
        Ok(needs_full_state)
    }

    /// Step 4: if the agent's reported hash matches the currently assigned
    /// config, just persist the status; otherwise push the config, then
    /// persist.
    fn reconcile_remote_status(
        &self,
        agent_id: &AgentId,
        remote_status: &fleet_common::model::RemoteConfigStatus,
    ) -> Result<(), fleet_common::error::DatabaseError> {
        let (_, current_hash) = self.assigner.config_map_for(agent_id);
        if current_hash != remote_status.last_remote_config_hash {
            self.push_config(agent_id);
        }
        self.repository.update_remote_config_status(agent_id, remote_status)
    }

    fn push_config(&self, agent_id: &AgentId) {
        let Some(sender) = self.connections.get(agent_id) else {
            return;
        };
        let (config, hash) = self.assigner.config_map_for(agent_id);
        let frame = OutgoingMessage {
            instance_uid: Vec::new(),
            flags: 0,
            remote_config: Some(RemoteConfigFrame {
                config,
                config_hash: hash,
            }),
            error_response: None,
        };
        if sender.send(frame).is_err() {
            warn!(%agent_id, "dropped config push: connection closed");
        }
    }

    pub fn on_connection_close(&self, peer_key: &str) {
        let Some((_, agent_id)) = self.peer_to_agent.remove(peer_key) else {
            warn!(peer = peer_key, "connection closed with no known agent mapping");
            return;
        };
        self.connections.remove(&agent_id);

        match self.repository.get_connection_state(&agent_id) {
            Ok(mut state) => {
                state.state = ConnectivityState::Disconnected;
                state.disconnected_at = Some(Utc::now());
                if let Err(e) = self.repository.update_connection_state(&agent_id, &state) {
                    warn!(%agent_id, error = %e, "failed to persist disconnect state");
                }
            }
            Err(e) => warn!(%agent_id, error = %e, "no connection state found on disconnect"),
        }
    }

    /// Disconnects every live connection (§5 shutdown).
    pub fn shutdown(&self) {
        self.connections.clear();
        self.peer_to_agent.clear();
    }
}

impl ConfigChangeNotifier for SessionCore {
    fn notify(&self, agent_id: &AgentId) {
        self.push_config(agent_id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use fleet_common::db::Database;

    use super::*;

    fn fixture() -> (Arc<AgentRepository>, Arc<AssignmentService>, SessionCore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let repository = Arc::new(AgentRepository::new(Arc::clone(&db)));
        let assigner = Arc::new(AssignmentService::new(Arc::clone(&db), Arc::clone(&repository)));
        let session = SessionCore::new(Arc::clone(&repository), Arc::clone(&assigner));
        (repository, assigner, session)
    }

    fn msg(seq: u64, instance_uid: &[u8]) -> IncomingMessage {
        IncomingMessage {
            instance_uid: instance_uid.to_vec(),
            sequence_num: seq,
            agent_description: Some(AgentDescriptionMsg {
                identifying_attributes: BTreeMap::from([("otelfleet.agent.id".to_string(), "agent-a".to_string())]),
                non_identifying_attributes: BTreeMap::new(),
            }),
            capabilities: 0,
            health: None,
            effective_config: None,
            remote_config_status: None,
        }
    }

    #[test]
    fn unregistered_agent_is_rejected_without_writes() {
        let (_, _, session) = fixture();
        let out = session.on_message("peer-1", msg(0, b"inst-1"));
        assert!(out.error_response.is_some());
        assert_eq!(out.flags, 0);
    }

    #[test]
    fn sequence_gap_sets_report_full_state() {
        let (repository, _, session) = fixture();
        repository.register(&AgentId::from("agent-a"), "Agent A").unwrap();

        let r0 = session.on_message("peer-1", msg(0, b"inst-1"));
        assert_eq!(r0.flags & FLAG_REPORT_FULL_STATE, 0);
        let r1 = session.on_message("peer-1", msg(1, b"inst-1"));
        assert_eq!(r1.flags & FLAG_REPORT_FULL_STATE, 0);
        let r2 = session.on_message("peer-1", msg(5, b"inst-1"));
        assert_eq!(r2.flags & FLAG_REPORT_FULL_STATE, FLAG_REPORT_FULL_STATE);
    }

    #[test]
    fn duplicate_sequence_sets_report_full_state() {
        let (repository, _, session) = fixture();
        repository.register(&AgentId::from("agent-a"), "Agent A").unwrap();

        session.on_message("peer-1", msg(0, b"inst-1"));
        session.on_message("peer-1", msg(1, b"inst-1"));
        let r2 = session.on_message("peer-1", msg(1, b"inst-1"));
        assert_eq!(r2.flags & FLAG_REPORT_FULL_STATE, FLAG_REPORT_FULL_STATE);
    }

    #[test]
    fn instance_change_sets_report_full_state_regardless_of_sequence() {
        let (repository, _, session) = fixture();
        repository.register(&AgentId::from("agent-a"), "Agent A").unwrap();

        session.on_message("peer-1", msg(0, b"inst-1"));
        let r1 = session.on_message("peer-1", msg(1, b"inst-2"));
        assert_eq!(r1.flags & FLAG_REPORT_FULL_STATE, FLAG_REPORT_FULL_STATE);
    }

    #[test]
    fn remote_status_is_persisted_even_when_agent_has_no_live_connection() {
        let (repository, assigner, session) = fixture();
        let agent_id = AgentId::from("agent-a");
        repository.register(&agent_id, "Agent A").unwrap();
        assigner
            .assign_config(&agent_id, &fleet_common::ids::ConfigId::from("nonexistent"))
            .ok();

        let mut report = msg(0, b"inst-1");
        report.remote_config_status = Some(fleet_common::model::RemoteConfigStatus {
            last_remote_config_hash: vec![9, 9, 9],
            status: fleet_common::model::RemoteConfigApplyStatus::Applying,
            error_message: String::new(),
        });
        let out = session.on_message("peer-1", report);
        assert!(out.error_response.is_none());

        let persisted = repository.get(&agent_id).unwrap();
        assert!(persisted.status.remote_config_status.is_some());
    }
}
