use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ConfigId, DeploymentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl DeploymentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentState::Completed | DeploymentState::Failed | DeploymentState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub deployment_id: DeploymentId,
    pub config_id: ConfigId,
    pub state: DeploymentState,
    pub total_agents: u32,
    pub pending_agents: u32,
    pub completed_agents: u32,
    pub failed_agents: u32,
    pub current_batch: u32,
    pub batch_size: u32,
    pub batch_delay_seconds: u64,
    pub max_failures: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentDeployState {
    Pending,
    Applying,
    Applied,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDeploymentStatus {
    pub agent_id: AgentId,
    pub state: AgentDeployState,
    pub applied_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}
