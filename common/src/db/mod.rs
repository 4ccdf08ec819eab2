pub mod tree;

use std::path::Path;

use crate::{
    error::DatabaseError,
    ids::AgentDeploymentKey,
    model::{
        AgentAttributes, AgentHealth, AgentRegistry, BootstrapToken, Config, ConfigAssignment,
        ConnectionState, DeploymentStatus, AgentDeploymentStatus, EffectiveConfig,
        RemoteConfigStatus,
    },
};
use tree::DbRecords;

/// Opens one `sled::Db` and one tree per record-kind prefix (§6 persisted
/// state layout). Each tree is a disjoint namespace; the key within a tree
/// is the record's natural id.
pub struct Database {
    db: sled::Db,
    pub tokens: DbRecords<BootstrapToken>,
    pub agents: DbRecords<AgentRegistry>,
    pub configs: DbRecords<Config>,
    pub default_configs: DbRecords<Config>,
    pub bootstrap_configs: DbRecords<Config>,
    pub assigned_configs: DbRecords<Config>,
    pub config_assignments: DbRecords<ConfigAssignment>,
    pub agent_attributes: DbRecords<AgentAttributes>,
    pub agent_health: DbRecords<AgentHealth>,
    pub effective_config: DbRecords<EffectiveConfig>,
    pub remote_config_status: DbRecords<RemoteConfigStatus>,
    pub connection_state: DbRecords<ConnectionState>,
    pub deployments: DbRecords<DeploymentStatus>,
    pub agent_deployments: DbRecords<AgentDeploymentStatus>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let db = sled::open(path)?;
        Ok(Self {
            tokens: DbRecords::new(db.open_tree("tokens")?),
            agents: DbRecords::new(db.open_tree("agents")?),
            configs: DbRecords::new(db.open_tree("configs")?),
            default_configs: DbRecords::new(db.open_tree("default-configs")?),
            bootstrap_configs: DbRecords::new(db.open_tree("bootstrap-configs")?),
            assigned_configs: DbRecords::new(db.open_tree("assigned-configs")?),
            config_assignments: DbRecords::new(db.open_tree("config-assignments")?),
            agent_attributes: DbRecords::new(db.open_tree("opamp-agent-description")?),
            agent_health: DbRecords::new(db.open_tree("agent-health")?),
            effective_config: DbRecords::new(db.open_tree("effective-config")?),
            remote_config_status: DbRecords::new(db.open_tree("remote-config-status")?),
            connection_state: DbRecords::new(db.open_tree("opamp-agents")?),
            deployments: DbRecords::new(db.open_tree("deployments")?),
            agent_deployments: DbRecords::new(db.open_tree("agent-deployments")?),
            db,
        })
    }

    pub fn flush(&self) -> Result<(), DatabaseError> {
        self.db.flush()?;
        Ok(())
    }
}

pub fn agent_deployment_key(key: &AgentDeploymentKey) -> String {
    key.to_string()
}
