use std::sync::Arc;

use fleet_common::{
    db::Database,
    error::DatabaseError,
    ids::AgentId,
    model::{
        Agent, AgentAttributes, AgentHealth, AgentRegistry, ConnectionState, EffectiveConfig,
        RemoteConfigStatus, RuntimeStatus,
    },
};
use tracing::warn;

/// One interface aggregating registry, attributes, connection, health,
/// effective-config and remote-status stores behind a single agent-centric
/// view (C3). Registry is authoritative: it gates `Exists` and is read
/// first on assemble, deleted last on delete.
pub struct AgentRepository {
    db: Arc<Database>,
}

impl AgentRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn exists(&self, id: &AgentId) -> Result<bool, DatabaseError> {
        self.db.agents.exists(id.as_str())
    }

    /// Registry lookup is authoritative. Every other store is best-effort
    /// enrichment: missing or erroring child stores are logged (NotFound is
    /// not logged, it is the expected empty case) and the field stays
    /// zero-valued.
    pub fn get(&self, id: &AgentId) -> Result<Agent, DatabaseError> {
        let registry: AgentRegistry = self.db.agents.get(id.as_str())?;

        let attributes = self.enrich(id, |db, key| db.agent_attributes.get_opt(key));
        let connection = self.enrich(id, |db, key| db.connection_state.get_opt(key));
        let health = self.enrich(id, |db, key| db.agent_health.get_opt(key));
        let effective_config = self.enrich(id, |db, key| db.effective_config.get_opt(key));
        let remote_config_status = self.enrich(id, |db, key| db.remote_config_status.get_opt(key));

        Ok(Agent {
            id: registry.id,
            friendly_name: registry.friendly_name,
            attributes: attributes.unwrap_or_default(),
            connection: connection.unwrap_or_default(),
            status: RuntimeStatus {
                health,
                effective_config,
                remote_config_status,
                config_sync_status: None,
                config_sync_reason: String::new(),
            },
        })
    }

    fn enrich<T>(
        &self,
        id: &AgentId,
        read: impl FnOnce(&Database, &str) -> Result<Option<T>, DatabaseError>,
    ) -> Option<T> {
        match read(&self.db, id.as_str()) {
            Ok(value) => value,
            Err(e) => {
                warn!(agent_id = %id, error = %e, "error enriching agent record");
                None
            }
        }
    }

    /// Iterates the registry; for each id delegates to `get`; logs and skips
    /// entries that fail to assemble.
    pub fn list(&self) -> Vec<Agent> {
        self.db
            .agents
            .list()
            .into_iter()
            .filter_map(|(_, registry): (String, AgentRegistry)| match self.get(&registry.id) {
                Ok(agent) => Some(agent),
                Err(e) => {
                    warn!(agent_id = %registry.id, error = %e, "skipping agent in listing");
                    None
                }
            })
            .collect()
    }

    pub fn register(&self, id: &AgentId, friendly_name: &str) -> Result<(), DatabaseError> {
        self.db.agents.put(
            id.as_str(),
            &AgentRegistry {
                id: id.clone(),
                friendly_name: friendly_name.to_owned(),
            },
        )
    }

    pub fn update_attributes(&self, id: &AgentId, attrs: &AgentAttributes) -> Result<(), DatabaseError> {
        self.db.agent_attributes.put(id.as_str(), attrs)
    }

    pub fn update_connection_state(&self, id: &AgentId, state: &ConnectionState) -> Result<(), DatabaseError> {
        self.db.connection_state.put(id.as_str(), state)
    }

    pub fn update_health(&self, id: &AgentId, health: &AgentHealth) -> Result<(), DatabaseError> {
        self.db.agent_health.put(id.as_str(), health)
    }

    pub fn update_effective_config(&self, id: &AgentId, config: &EffectiveConfig) -> Result<(), DatabaseError> {
        self.db.effective_config.put(id.as_str(), config)
    }

    pub fn update_remote_config_status(&self, id: &AgentId, status: &RemoteConfigStatus) -> Result<(), DatabaseError> {
        self.db.remote_config_status.put(id.as_str(), status)
    }

    /// Fast path avoiding the six-store fan-out.
    pub fn get_connection_state(&self, id: &AgentId) -> Result<ConnectionState, DatabaseError> {
        self.db.connection_state.get(id.as_str())
    }

    /// Deletes children then the registry record. Per-child NotFound is
    /// silently ignored; other child errors are logged; registry failure is
    /// fatal and returned.
    pub fn delete(&self, id: &AgentId) -> Result<(), DatabaseError> {
        let key = id.as_str();
        for (name, result) in [
            ("attributes", self.db.agent_attributes.delete(key).map(|_| ())),
            ("connection", self.db.connection_state.delete(key).map(|_| ())),
            ("health", self.db.agent_health.delete(key).map(|_| ())),
            ("effective_config", self.db.effective_config.delete(key).map(|_| ())),
            ("remote_config_status", self.db.remote_config_status.delete(key).map(|_| ())),
            ("assigned_config", self.db.assigned_configs.delete(key).map(|_| ())),
            ("config_assignment", self.db.config_assignments.delete(key).map(|_| ())),
        ] {
            if let Err(e) = result {
                warn!(agent_id = %id, store = name, error = %e, "error deleting agent child record");
            }
        }
        self.db.agents.delete(key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fleet_common::model::ConnectivityState;

    use super::*;

    fn repository() -> AgentRepository {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        AgentRepository::new(db)
    }

    #[test]
    fn register_then_get_round_trips() {
        let repo = repository();
        let id = AgentId::from("agent-a");
        repo.register(&id, "Agent A").unwrap();

        let agent = repo.get(&id).unwrap();
        assert_eq!(agent.id, id);
        assert_eq!(agent.friendly_name, "Agent A");
        assert!(agent.status.health.is_none());
    }

    #[test]
    fn enrichment_survives_partial_writes() {
        let repo = repository();
        let id = AgentId::from("agent-a");
        repo.register(&id, "Agent A").unwrap();
        repo.update_connection_state(
            &id,
            &ConnectionState {
                state: ConnectivityState::Connected,
                ..Default::default()
            },
        )
        .unwrap();

        let agent = repo.get(&id).unwrap();
        assert_eq!(agent.connection.state, ConnectivityState::Connected);
        assert!(agent.status.health.is_none());
    }

    #[test]
    fn get_on_unregistered_agent_is_not_found() {
        let repo = repository();
        let err = repo.get(&AgentId::from("ghost")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_removes_agent_from_listing() {
        let repo = repository();
        let id = AgentId::from("agent-a");
        repo.register(&id, "Agent A").unwrap();
        assert_eq!(repo.list().len(), 1);

        repo.delete(&id).unwrap();
        assert_eq!(repo.list().len(), 0);
        assert!(!repo.exists(&id).unwrap());
    }
}
