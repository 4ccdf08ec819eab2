use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ConfigId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub id: ConfigId,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentSource {
    Manual,
    ByLabels,
    Bootstrap,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAssignment {
    pub agent_id: AgentId,
    pub config_id: ConfigId,
    pub source: AssignmentSource,
    pub assigned_at: DateTime<Utc>,
    /// Canonical hash (§4.4) of the config-map payload at assignment time.
    pub config_hash: Vec<u8>,
}
