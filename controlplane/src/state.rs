use std::sync::Arc;

use fleet_common::db::Database;

use crate::{
    opamp::SessionCore,
    repository::AgentRepository,
    services::{
        assignment::{AssignmentService, ConfigChangeNotifier},
        bootstrap::BootstrapService,
        catalog::ConfigCatalog,
        deployment::DeploymentController,
        signing::SigningKey,
        token::TokenService,
    },
};

/// Constructed once at startup and passed explicitly to every handler (no
/// hidden global state, §9). Owns the storage handle and every service; the
/// notifier cycle (`AssignmentService.notifier -> SessionCore`,
/// `DeploymentController.assigner -> AssignmentService`) is wired via
/// `AssignmentService::set_notifier` after both halves exist.
pub struct GlobalState {
    pub db: Arc<Database>,
    pub repository: Arc<AgentRepository>,
    pub tokens: Arc<TokenService>,
    pub bootstrap: Arc<BootstrapService>,
    pub catalog: Arc<ConfigCatalog>,
    pub assignment: Arc<AssignmentService>,
    pub deployments: Arc<DeploymentController>,
    pub session: Arc<SessionCore>,
}

pub type AppState = Arc<GlobalState>;

impl GlobalState {
    pub fn load(db: Database, signing_key: SigningKey) -> Arc<Self> {
        let db = Arc::new(db);
        let signing_key = Arc::new(signing_key);

        let repository = Arc::new(AgentRepository::new(Arc::clone(&db)));
        let tokens = Arc::new(TokenService::new(Arc::clone(&db), Arc::clone(&signing_key)));
        let bootstrap = Arc::new(BootstrapService::new(
            Arc::clone(&db),
            Arc::clone(&repository),
            Arc::clone(&signing_key),
        ));
        let catalog = Arc::new(ConfigCatalog::new(Arc::clone(&db)));
        let assignment = Arc::new(AssignmentService::new(Arc::clone(&db), Arc::clone(&repository)));
        let session = Arc::new(SessionCore::new(Arc::clone(&repository), Arc::clone(&assignment)));
        assignment.set_notifier(Arc::clone(&session) as Arc<dyn ConfigChangeNotifier>);

        let deployments = Arc::new(DeploymentController::new(
            Arc::clone(&db),
            Arc::clone(&repository),
            Arc::clone(&assignment),
        ));

        Arc::new(Self {
            db,
            repository,
            tokens,
            bootstrap,
            catalog,
            assignment,
            deployments,
            session,
        })
    }

    /// Disconnects all live OpAMP connections and fires every registered
    /// deployment cancellation (§5 resource lifecycle).
    pub fn shutdown(&self) {
        self.session.shutdown();
        self.deployments.shutdown();
    }
}
