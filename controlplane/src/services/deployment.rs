use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use dashmap::DashMap;
use fleet_common::{
    db::Database,
    error::DatabaseError,
    ids::{AgentDeploymentKey, AgentId, ConfigId, DeploymentId},
    label,
    model::{AgentDeployState, AgentDeploymentStatus, DeploymentState, DeploymentStatus},
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::{ServiceError, assignment::AssignmentService, error::NotFoundContext};
use crate::repository::AgentRepository;

pub enum AgentSelector {
    Ids(Vec<AgentId>),
    Labels(HashMap<String, String>),
}

pub struct StartDeploymentRequest {
    pub config_id: ConfigId,
    pub agents: AgentSelector,
    pub batch_size: u32,
    pub batch_delay_seconds: u64,
    pub max_failures: u32,
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 100;
const PAUSE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_PAUSE_READ_FAILURES: u32 = 5;

/// Batched asynchronous rollout state machine (C9). One cancellation token
/// per live deployment, guarded by its own map per §5 ("Active-deployments
/// cancellation-handle map ... protected by its own read-write lock" —
/// `DashMap` gives that without a separate lock).
pub struct DeploymentController {
    db: Arc<Database>,
    repository: Arc<AgentRepository>,
    assigner: Arc<AssignmentService>,
    cancellations: DashMap<DeploymentId, CancellationToken>,
}

impl DeploymentController {
    pub fn new(db: Arc<Database>, repository: Arc<AgentRepository>, assigner: Arc<AssignmentService>) -> Self {
        Self {
            db,
            repository,
            assigner,
            cancellations: DashMap::new(),
        }
    }

    pub fn start_deployment(
        self: &Arc<Self>,
        req: StartDeploymentRequest,
    ) -> Result<DeploymentStatus, ServiceError> {
        if !self.db.configs.exists(req.config_id.as_str()).map_err(ServiceError::from_storage)? {
            return Err(ServiceError::NotFound(format!("config not found: {}", req.config_id)));
        }
        if req.batch_size == 0 {
            return Err(ServiceError::InvalidArgument("batch_size must be at least 1".into()));
        }

        let agent_ids = self.resolve_agents(&req.agents)?;
        if agent_ids.is_empty() {
            return Err(ServiceError::InvalidArgument("no agents matched".into()));
        }

        let deployment_id = DeploymentId::new();
        let status = DeploymentStatus {
            deployment_id,
            config_id: req.config_id.clone(),
            state: DeploymentState::Pending,
            total_agents: agent_ids.len() as u32,
            pending_agents: agent_ids.len() as u32,
            completed_agents: 0,
            failed_agents: 0,
            current_batch: 0,
            batch_size: req.batch_size,
            batch_delay_seconds: req.batch_delay_seconds,
            max_failures: req.max_failures,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.db
            .deployments
            .put(&deployment_id.to_string(), &status)
            .map_err(ServiceError::from_storage)?;

        for agent_id in &agent_ids {
            let key = AgentDeploymentKey(deployment_id, agent_id.clone());
            self.db
                .agent_deployments
                .put(
                    &key.to_string(),
                    &AgentDeploymentStatus {
                        agent_id: agent_id.clone(),
                        state: AgentDeployState::Pending,
                        applied_at: None,
                        error_message: None,
                    },
                )
                .map_err(ServiceError::from_storage)?;
        }

        let token = CancellationToken::new();
        self.cancellations.insert(deployment_id, token.clone());

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.run_worker(deployment_id, req.config_id, agent_ids, req.batch_size, req.batch_delay_seconds, req.max_failures, token).await;
        });

        Ok(status)
    }

    fn resolve_agents(&self, selector: &AgentSelector) -> Result<Vec<AgentId>, ServiceError> {
        match selector {
            AgentSelector::Ids(ids) => Ok(ids.clone()),
            AgentSelector::Labels(labels) => {
                if labels.is_empty() {
                    return Err(ServiceError::InvalidArgument("labels must be non-empty".into()));
                }
                Ok(self
                    .repository
                    .list()
                    .into_iter()
                    .filter(|agent| label::matches(labels, &agent.attributes.flattened()))
                    .map(|agent| agent.id)
                    .collect())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_worker(
        &self,
        deployment_id: DeploymentId,
        config_id: ConfigId,
        agent_ids: Vec<AgentId>,
        batch_size: u32,
        batch_delay_seconds: u64,
        max_failures: u32,
        token: CancellationToken,
    ) {
        if let Err(e) = self.transition(deployment_id, DeploymentState::InProgress) {
            error!(%deployment_id, error = %e, "failed to start deployment worker");
            self.cancellations.remove(&deployment_id);
            return;
        }

        let mut failure_count = 0u32;
        let mut terminal = DeploymentState::Completed;

        'batches: for batch in agent_ids.chunks(batch_size as usize) {
            if !self.await_runnable(deployment_id, &token).await {
                terminal = DeploymentState::Cancelled;
                break 'batches;
            }

            for agent_id in batch {
                if token.is_cancelled() {
                    terminal = DeploymentState::Cancelled;
                    break 'batches;
                }

                self.set_agent_state(deployment_id, agent_id, AgentDeployState::Applying, None);

                match retry(RETRY_ATTEMPTS, RETRY_BASE_DELAY_MS, || {
                    self.assigner.assign_config(agent_id, &config_id)
                })
                .await
                {
                    Ok(()) => {
                        self.set_agent_state(deployment_id, agent_id, AgentDeployState::Applied, None);
                        self.update_counts(deployment_id, |s| {
                            s.completed_agents += 1;
                            s.pending_agents = s.pending_agents.saturating_sub(1);
                        });
                    }
                    Err(e) => {
                        let message = e.to_string();
                        self.set_agent_state(
                            deployment_id,
                            agent_id,
                            AgentDeployState::Failed,
                            Some(message.clone()),
                        );
                        self.update_counts(deployment_id, |s| {
                            s.failed_agents += 1;
                            s.pending_agents = s.pending_agents.saturating_sub(1);
                        });
                        failure_count += 1;
                        if max_failures > 0 && failure_count >= max_failures {
                            terminal = DeploymentState::Failed;
                            break 'batches;
                        }
                    }
                }
            }

            self.update_counts(deployment_id, |s| s.current_batch += 1);

            if batch_delay_seconds > 0 {
                tokio::select! {
                    _ = sleep(Duration::from_secs(batch_delay_seconds)) => {}
                    _ = token.cancelled() => {
                        terminal = DeploymentState::Cancelled;
                        break 'batches;
                    }
                }
            }
        }

        if let Err(e) = self.transition(deployment_id, terminal) {
            error!(%deployment_id, error = %e, "failed to finalize deployment state");
        }
        self.cancellations.remove(&deployment_id);
    }

    /// Polls every second while `Paused`, honoring cancellation. Returns
    /// `false` if cancelled or if more than 5 consecutive reads fail.
    async fn await_runnable(&self, deployment_id: DeploymentId, token: &CancellationToken) -> bool {
        let mut read_failures = 0u32;
        loop {
            if token.is_cancelled() {
                return false;
            }
            match self.db.deployments.get(&deployment_id.to_string()) {
                Ok(status) => {
                    read_failures = 0;
                    match status.state {
                        DeploymentState::Paused => {}
                        DeploymentState::Cancelled => return false,
                        _ => return true,
                    }
                }
                Err(e) => {
                    read_failures += 1;
                    warn!(%deployment_id, error = %e, "failed to read deployment state while paused");
                    if read_failures > MAX_PAUSE_READ_FAILURES {
                        let _ = self.transition(deployment_id, DeploymentState::Failed);
                        return false;
                    }
                }
            }
            tokio::select! {
                _ = sleep(PAUSE_POLL_INTERVAL) => {}
                _ = token.cancelled() => return false,
            }
        }
    }

    fn transition(&self, deployment_id: DeploymentId, state: DeploymentState) -> Result<(), DatabaseError> {
        self.update_counts(deployment_id, |s| {
            s.state = state;
            if state.is_terminal() {
                s.completed_at = Some(Utc::now());
            }
        })
    }

    fn update_counts(
        &self,
        deployment_id: DeploymentId,
        mutate: impl FnOnce(&mut DeploymentStatus),
    ) -> Result<(), DatabaseError> {
        let key = deployment_id.to_string();
        let mut status = self.db.deployments.get(&key)?;
        mutate(&mut status);
        self.db.deployments.put(&key, &status)
    }

    fn set_agent_state(
        &self,
        deployment_id: DeploymentId,
        agent_id: &AgentId,
        state: AgentDeployState,
        error_message: Option<String>,
    ) {
        let key = AgentDeploymentKey(deployment_id, agent_id.clone()).to_string();
        let applied_at = matches!(state, AgentDeployState::Applied).then(Utc::now);
        let record = AgentDeploymentStatus {
            agent_id: agent_id.clone(),
            state,
            applied_at,
            error_message,
        };
        if let Err(e) = self.db.agent_deployments.put(&key, &record) {
            error!(%deployment_id, %agent_id, error = %e, "failed to persist agent deployment state");
        }
    }

    pub fn pause_deployment(&self, deployment_id: DeploymentId) -> Result<(), ServiceError> {
        self.transition_guarded(deployment_id, DeploymentState::InProgress, DeploymentState::Paused)
    }

    pub fn resume_deployment(&self, deployment_id: DeploymentId) -> Result<(), ServiceError> {
        self.transition_guarded(deployment_id, DeploymentState::Paused, DeploymentState::InProgress)
    }

    pub fn cancel_deployment(&self, deployment_id: DeploymentId) -> Result<(), ServiceError> {
        let key = deployment_id.to_string();
        let status: DeploymentStatus = self
            .db
            .deployments
            .get(&key)
            .or_not_found(format!("deployment not found: {deployment_id}"))?;
        if status.state.is_terminal() {
            return Err(ServiceError::InvalidArgument("deployment already terminal".into()));
        }
        if let Some(token) = self.cancellations.get(&deployment_id) {
            token.cancel();
        }
        Ok(())
    }

    fn transition_guarded(
        &self,
        deployment_id: DeploymentId,
        expected: DeploymentState,
        next: DeploymentState,
    ) -> Result<(), ServiceError> {
        let key = deployment_id.to_string();
        let mut status: DeploymentStatus = self
            .db
            .deployments
            .get(&key)
            .or_not_found(format!("deployment not found: {deployment_id}"))?;
        if status.state != expected {
            return Err(ServiceError::InvalidArgument(format!(
                "cannot transition deployment from {:?} to {:?}",
                status.state, next
            )));
        }
        status.state = next;
        self.db.deployments.put(&key, &status).map_err(ServiceError::from_storage)
    }

    pub fn get_deployment_status(&self, deployment_id: DeploymentId) -> Result<DeploymentStatus, ServiceError> {
        self.db
            .deployments
            .get(&deployment_id.to_string())
            .or_not_found(format!("deployment not found: {deployment_id}"))
    }

    pub fn list_deployments(&self, state_filter: Option<DeploymentState>) -> Vec<DeploymentStatus> {
        self.db
            .deployments
            .list()
            .into_iter()
            .map(|(_, s)| s)
            .filter(|s| match state_filter {
                Some(filter) => s.state == filter,
                None => true,
            })
            .collect()
    }

    /// Fires every registered cancellation on shutdown (§5).
    pub fn shutdown(&self) {
        for entry in self.cancellations.iter() {
            entry.value().cancel();
        }
    }
}

/// Small retry helper for storage operations inside the worker: exponential
/// backoff, 3 attempts base 100ms, never retries `NotFound` (§4.14, §9).
async fn retry<T>(
    attempts: u32,
    base_delay_ms: u64,
    mut op: impl FnMut() -> Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    let mut delay = base_delay_ms;
    for attempt in 0..attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(ServiceError::NotFound(msg)) => return Err(ServiceError::NotFound(msg)),
            Err(e) if attempt + 1 < attempts => {
                warn!(attempt, error = %e, "retrying storage operation");
                sleep(Duration::from_millis(delay)).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use fleet_common::model::Config;

    use super::*;
    use crate::repository::AgentRepository;

    async fn fixture() -> (Arc<Database>, Arc<AgentRepository>, Arc<DeploymentController>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let repository = Arc::new(AgentRepository::new(Arc::clone(&db)));
        let assigner = Arc::new(AssignmentService::new(Arc::clone(&db), Arc::clone(&repository)));
        let controller = Arc::new(DeploymentController::new(
            Arc::clone(&db),
            Arc::clone(&repository),
            assigner,
        ));
        (db, repository, controller)
    }

    #[tokio::test]
    async fn deployment_aborts_once_failure_budget_is_exhausted() {
        let (db, repository, controller) = fixture().await;
        db.configs
            .put("cfg-1", &Config { id: ConfigId::from("cfg-1"), bytes: b"hello".to_vec() })
            .unwrap();
        for i in 0..4 {
            repository
                .register(&AgentId::from(format!("agent-{i}")), "agent")
                .unwrap();
        }
        let agent_ids: Vec<AgentId> = (0..4).map(|i| AgentId::from(format!("agent-{i}"))).collect();

        let status = controller
            .start_deployment(StartDeploymentRequest {
                config_id: ConfigId::from("cfg-1"),
                agents: AgentSelector::Ids(agent_ids),
                batch_size: 1,
                batch_delay_seconds: 0,
                max_failures: 2,
            })
            .unwrap();

        // Pull the config out from under the worker so every assign attempt 404s.
        db.configs.delete("cfg-1").unwrap();

        let deployment_id = status.deployment_id;
        let mut final_status = status;
        for _ in 0..50 {
            final_status = controller.get_deployment_status(deployment_id).unwrap();
            if final_status.state.is_terminal() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(final_status.state, DeploymentState::Failed);
        assert_eq!(final_status.failed_agents, 2);
        assert_eq!(final_status.pending_agents, 2);
    }

    #[tokio::test]
    async fn pause_resume_and_cancel_reject_wrong_state_transitions() {
        let (db, repository, controller) = fixture().await;
        db.configs
            .put("cfg-1", &Config { id: ConfigId::from("cfg-1"), bytes: b"hello".to_vec() })
            .unwrap();
        repository.register(&AgentId::from("agent-0"), "agent").unwrap();

        let status = controller
            .start_deployment(StartDeploymentRequest {
                config_id: ConfigId::from("cfg-1"),
                agents: AgentSelector::Ids(vec![AgentId::from("agent-0")]),
                batch_size: 1,
                batch_delay_seconds: 0,
                max_failures: 0,
            })
            .unwrap();

        // Pending deployments cannot resume (they haven't paused).
        assert!(controller.resume_deployment(status.deployment_id).is_err());
    }
}
