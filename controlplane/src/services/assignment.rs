use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use chrono::Utc;
use fleet_common::{
    db::Database,
    hash::canonical_hash,
    ids::{AgentId, ConfigId},
    label,
    model::{AssignmentSource, Config, ConfigAssignment, ConfigSyncStatus},
    sync_status,
};

use super::{ServiceError, config_map, error::NotFoundContext};
use crate::repository::AgentRepository;

/// One-way notification edge (§4.9) implemented by the session core.
/// Non-blocking; a no-op if the agent has no active session. Notifications
/// are not deduplicated: callers are idempotent (agents reconcile by hash).
pub trait ConfigChangeNotifier: Send + Sync {
    fn notify(&self, agent_id: &AgentId);
}

pub struct BatchOutcome {
    pub successful: u32,
    pub failed: u32,
    pub failed_agent_ids: Vec<AgentId>,
}

pub struct LabelAssignOutcome {
    pub successful: u32,
    pub failed: u32,
    pub matched_agent_ids: Vec<AgentId>,
}

pub struct ConfigStatus {
    pub assignment: ConfigAssignment,
    pub in_sync: bool,
    pub sync_status: ConfigSyncStatus,
    pub sync_reason: String,
}

/// Binds agents to configs, computes hashes and in-sync status, and wakes
/// the session core on change (C7). The notifier is resolved after
/// construction via `set_notifier` to break the `ConfigServer.notifier ->
/// OpampServer` / `DeploymentController.assigner -> ConfigServer` cycle
/// without strong cyclic ownership (§9).
pub struct AssignmentService {
    db: Arc<Database>,
    repository: Arc<AgentRepository>,
    notifier: OnceLock<Arc<dyn ConfigChangeNotifier>>,
}

impl AssignmentService {
    pub fn new(db: Arc<Database>, repository: Arc<AgentRepository>) -> Self {
        Self {
            db,
            repository,
            notifier: OnceLock::new(),
        }
    }

    pub fn set_notifier(&self, notifier: Arc<dyn ConfigChangeNotifier>) {
        let _ = self.notifier.set(notifier);
    }

    fn notify(&self, agent_id: &AgentId) {
        if let Some(notifier) = self.notifier.get() {
            notifier.notify(agent_id);
        }
    }

    pub fn assign_config(&self, agent_id: &AgentId, config_id: &ConfigId) -> Result<(), ServiceError> {
        self.assign_config_with_source(agent_id, config_id, AssignmentSource::Manual)
    }

    fn assign_config_with_source(
        &self,
        agent_id: &AgentId,
        config_id: &ConfigId,
        source: AssignmentSource,
    ) -> Result<(), ServiceError> {
        if !self
            .repository
            .exists(agent_id)
            .map_err(ServiceError::from_storage)?
        {
            return Err(ServiceError::NotFound(format!("agent not found: {agent_id}")));
        }
        let config: Config = self
            .db
            .configs
            .get(config_id.as_str())
            .or_not_found(format!("config not found: {config_id}"))?;

        let map = fleet_common::hash::AgentConfigMap::single("config.yaml", config.bytes.clone(), "text/yaml");
        let hash = canonical_hash(&map);

        self.db
            .assigned_configs
            .put(agent_id.as_str(), &config)
            .map_err(ServiceError::from_storage)?;
        self.db
            .config_assignments
            .put(
                agent_id.as_str(),
                &ConfigAssignment {
                    agent_id: agent_id.clone(),
                    config_id: config_id.clone(),
                    source,
                    assigned_at: Utc::now(),
                    config_hash: hash,
                },
            )
            .map_err(ServiceError::from_storage)?;

        self.notify(agent_id);
        Ok(())
    }

    pub fn unassign_config(&self, agent_id: &AgentId) -> Result<(), ServiceError> {
        self.db
            .assigned_configs
            .delete(agent_id.as_str())
            .map_err(ServiceError::from_storage)?;
        self.db
            .config_assignments
            .delete(agent_id.as_str())
            .map_err(ServiceError::from_storage)?;
        self.notify(agent_id);
        Ok(())
    }

    /// Only successes are notified.
    pub fn batch_assign_config(&self, agent_ids: &[AgentId], config_id: &ConfigId) -> BatchOutcome {
        let mut successful = 0;
        let mut failed_agent_ids = Vec::new();
        for agent_id in agent_ids {
            match self.assign_config(agent_id, config_id) {
                Ok(()) => successful += 1,
                Err(_) => failed_agent_ids.push(agent_id.clone()),
            }
        }
        BatchOutcome {
            successful,
            failed: failed_agent_ids.len() as u32,
            failed_agent_ids,
        }
    }

    pub fn assign_config_by_labels(
        &self,
        config_id: &ConfigId,
        labels: &HashMap<String, String>,
    ) -> Result<LabelAssignOutcome, ServiceError> {
        if labels.is_empty() {
            return Err(ServiceError::InvalidArgument("labels must be non-empty".into()));
        }
        let matched: Vec<AgentId> = self
            .repository
            .list()
            .into_iter()
            .filter(|agent| label::matches(labels, &agent.attributes.flattened()))
            .map(|agent| agent.id)
            .collect();

        let mut successful = 0;
        let mut failed = 0;
        for agent_id in &matched {
            match self.assign_config_with_source(agent_id, config_id, AssignmentSource::ByLabels) {
                Ok(()) => successful += 1,
                Err(_) => failed += 1,
            }
        }
        Ok(LabelAssignOutcome {
            successful,
            failed,
            matched_agent_ids: matched,
        })
    }

    pub fn get_agent_config(&self, agent_id: &AgentId) -> Result<ConfigAssignment, ServiceError> {
        self.db
            .config_assignments
            .get(agent_id.as_str())
            .or_not_found(format!("no config assigned: {agent_id}"))
    }

    pub fn list_config_assignments(&self, config_id: Option<&ConfigId>) -> Vec<ConfigAssignment> {
        self.db
            .config_assignments
            .list()
            .into_iter()
            .map(|(_, a)| a)
            .filter(|a| match config_id {
                Some(filter) => &a.config_id == filter,
                None => true,
            })
            .collect()
    }

    pub fn get_config_status(&self, agent_id: &AgentId) -> Result<ConfigStatus, ServiceError> {
        let assignment = self
            .db
            .config_assignments
            .get(agent_id.as_str())
            .or_not_found("no config assigned".to_owned())?;

        let remote_status = self
            .db
            .remote_config_status
            .get_opt(agent_id.as_str())
            .map_err(ServiceError::from_storage)?;

        let (sync_status, sync_reason) =
            sync_status::compute(Some(&assignment.config_hash), remote_status.as_ref());

        let in_sync = remote_status
            .as_ref()
            .is_some_and(|status| status.last_remote_config_hash == assignment.config_hash)
            && matches!(sync_status, ConfigSyncStatus::InSync);

        Ok(ConfigStatus {
            assignment,
            in_sync,
            sync_status,
            sync_reason,
        })
    }

    pub(crate) fn config_map_for(&self, agent_id: &AgentId) -> (fleet_common::hash::AgentConfigMap, Vec<u8>) {
        config_map::build_for_agent(&self.db, agent_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use fleet_common::model::{RemoteConfigApplyStatus, RemoteConfigStatus};

    use super::*;
    use crate::repository::AgentRepository;

    struct CountingNotifier {
        count: AtomicU32,
    }

    impl ConfigChangeNotifier for CountingNotifier {
        fn notify(&self, _agent_id: &AgentId) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fixture() -> (Arc<Database>, Arc<AgentRepository>, Arc<AssignmentService>, Arc<CountingNotifier>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let repository = Arc::new(AgentRepository::new(Arc::clone(&db)));
        let assigner = Arc::new(AssignmentService::new(Arc::clone(&db), Arc::clone(&repository)));
        let notifier = Arc::new(CountingNotifier { count: AtomicU32::new(0) });
        assigner.set_notifier(notifier.clone() as Arc<dyn ConfigChangeNotifier>);
        (db, repository, assigner, notifier)
    }

    #[test]
    fn assign_and_unassign_both_notify() {
        let (db, repository, assigner, notifier) = fixture();
        let agent_id = AgentId::from("agent-a");
        repository.register(&agent_id, "Agent A").unwrap();
        db.configs
            .put("cfg-1", &Config { id: ConfigId::from("cfg-1"), bytes: b"hello".to_vec() })
            .unwrap();

        assigner.assign_config(&agent_id, &ConfigId::from("cfg-1")).unwrap();
        assert_eq!(notifier.count.load(Ordering::SeqCst), 1);

        assigner.unassign_config(&agent_id).unwrap();
        assert_eq!(notifier.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn assign_to_missing_agent_does_not_notify() {
        let (_, _, assigner, notifier) = fixture();
        let err = assigner.assign_config(&AgentId::from("ghost"), &ConfigId::from("cfg-1"));
        assert!(err.is_err());
        assert_eq!(notifier.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn in_sync_requires_matching_hash_and_applied_status() {
        let (db, repository, assigner, _) = fixture();
        let agent_id = AgentId::from("agent-a");
        repository.register(&agent_id, "Agent A").unwrap();
        db.configs
            .put("cfg-1", &Config { id: ConfigId::from("cfg-1"), bytes: b"hello".to_vec() })
            .unwrap();
        assigner.assign_config(&agent_id, &ConfigId::from("cfg-1")).unwrap();

        let assignment = assigner.get_agent_config(&agent_id).unwrap();

        // Matching hash but status still Applying: not in sync.
        db.remote_config_status
            .put(
                agent_id.as_str(),
                &RemoteConfigStatus {
                    last_remote_config_hash: assignment.config_hash.clone(),
                    status: RemoteConfigApplyStatus::Applying,
                    error_message: String::new(),
                },
            )
            .unwrap();
        let status = assigner.get_config_status(&agent_id).unwrap();
        assert!(!status.in_sync);

        // Matching hash and Applied: in sync.
        db.remote_config_status
            .put(
                agent_id.as_str(),
                &RemoteConfigStatus {
                    last_remote_config_hash: assignment.config_hash.clone(),
                    status: RemoteConfigApplyStatus::Applied,
                    error_message: String::new(),
                },
            )
            .unwrap();
        let status = assigner.get_config_status(&agent_id).unwrap();
        assert!(status.in_sync);
        assert!(matches!(status.sync_status, ConfigSyncStatus::InSync));

        // Applied but stale hash: not in sync.
        db.remote_config_status
            .put(
                agent_id.as_str(),
                &RemoteConfigStatus {
                    last_remote_config_hash: vec![0xff],
                    status: RemoteConfigApplyStatus::Applied,
                    error_message: String::new(),
                },
            )
            .unwrap();
        let status = assigner.get_config_status(&agent_id).unwrap();
        assert!(!status.in_sync);
    }
}
