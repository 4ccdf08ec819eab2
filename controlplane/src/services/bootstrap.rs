use std::sync::Arc;

use chrono::Utc;
use fleet_common::{
    db::Database,
    ids::{AgentId, ConfigId, TokenId},
    model::{AssignmentSource, Config, ConfigAssignment},
};
use openssl::{bn::BigNumContext, derive::Deriver, ec::{EcGroup, EcKey, EcPoint}, nid::Nid, pkey::PKey};

use super::{ServiceError, error::NotFoundContext, signing::SigningKey};
use crate::repository::AgentRepository;

pub struct BootstrapOutcome {
    pub server_pub_key: Vec<u8>,
}

pub struct BootstrapService {
    db: Arc<Database>,
    repository: Arc<AgentRepository>,
    signing_key: Arc<SigningKey>,
}

impl BootstrapService {
    pub fn new(db: Arc<Database>, repository: Arc<AgentRepository>, signing_key: Arc<SigningKey>) -> Self {
        Self { db, repository, signing_key }
    }

    pub fn bootstrap(
        &self,
        client_id: &str,
        friendly_name: &str,
        client_pub_key: &[u8],
        bearer: &str,
    ) -> Result<BootstrapOutcome, ServiceError> {
        if client_id.is_empty() || friendly_name.is_empty() {
            return Err(ServiceError::InvalidArgument("client id and name must be non-empty".into()));
        }

        let config_reference = self.verify_bearer(bearer)?;
        let server_pub_key = derive_ecdh(client_pub_key)?;

        let agent_id = AgentId::from(client_id);
        if !self
            .repository
            .exists(&agent_id)
            .map_err(ServiceError::from_storage)?
        {
            self.repository
                .register(&agent_id, friendly_name)
                .map_err(ServiceError::from_storage)?;
        }

        if let Some(config_id) = config_reference {
            self.assign_bootstrap_config(&agent_id, &config_id)?;
        }

        Ok(BootstrapOutcome { server_pub_key })
    }

    /// Verifies the bearer per §4.6 step 1. In secure mode, the bearer is a
    /// detached JWS produced by `TokenService::signatures`; it is verified
    /// against the server's public key and its embedded token id must still
    /// exist in the token store. In insecure/dev mode any non-empty bearer
    /// is accepted, preserving the source's documented (if surprising)
    /// behavior (§9).
    fn verify_bearer(&self, bearer: &str) -> Result<Option<ConfigId>, ServiceError> {
        if !self.signing_key.is_secure() {
            if bearer.is_empty() {
                return Err(ServiceError::InvalidArgument("missing bearer token".into()));
            }
            return Ok(None);
        }

        let payload = self.signing_key.verify(bearer)?;
        let token_id = TokenId(payload.id);
        let token = self
            .db
            .tokens
            .get(token_id.as_str())
            .or_not_found("bootstrap token not found".to_owned())?;
        if token.secret != payload.secret {
            return Err(ServiceError::InvalidArgument("invalid bearer token".into()));
        }
        Ok(token.config_reference)
    }

    fn assign_bootstrap_config(&self, agent_id: &AgentId, config_id: &ConfigId) -> Result<(), ServiceError> {
        let config: Config = self
            .db
            .configs
            .get(config_id.as_str())
            .or_not_found(format!("config not found: {config_id}"))?;
        let map = fleet_common::hash::AgentConfigMap::single("config.yaml", config.bytes.clone(), "text/yaml");
        let hash = fleet_common::hash::canonical_hash(&map);

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
                    source: AssignmentSource::Bootstrap,
                    assigned_at: Utc::now(),
                    config_hash: hash,
                },
            )
            .map_err(ServiceError::from_storage)?;
        Ok(())
    }
}

fn derive_ecdh(client_pub_key: &[u8]) -> Result<Vec<u8>, ServiceError> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)
        .map_err(|e| ServiceError::Internal(format!("ecdh group error: {e}")))?;

    let server_key = EcKey::generate(&group)
        .map_err(|e| ServiceError::Internal(format!("ecdh keygen error: {e}")))?;

    let mut ctx = BigNumContext::new().map_err(|e| ServiceError::Internal(format!("bignum ctx error: {e}")))?;
    let client_point = EcPoint::from_bytes(&group, client_pub_key, &mut ctx)
        .map_err(|_| ServiceError::InvalidArgument("invalid client public key".into()))?;
    let client_key = EcKey::from_public_key(&group, &client_point)
        .map_err(|_| ServiceError::InvalidArgument("invalid client public key".into()))?;

    let server_pkey = PKey::from_ec_key(server_key.clone())
        .map_err(|e| ServiceError::Internal(format!("ecdh pkey error: {e}")))?;
    let client_pkey = PKey::from_ec_key(client_key)
        .map_err(|_| ServiceError::InvalidArgument("invalid client public key".into()))?;

    let mut deriver = Deriver::new(&server_pkey)
        .map_err(|e| ServiceError::Internal(format!("ecdh deriver error: {e}")))?;
    deriver
        .set_peer(&client_pkey)
        .map_err(|_| ServiceError::InvalidArgument("invalid client public key".into()))?;
    // The shared secret itself is not part of this interface's return value
    // (consumed by the out-of-scope agent-side supervisor); deriving it here
    // validates the client's public key is a point on the curve.
    let _shared_secret = deriver
        .derive_to_vec()
        .map_err(|e| ServiceError::Internal(format!("ecdh derive error: {e}")))?;

    let server_ec = server_pkey
        .ec_key()
        .map_err(|e| ServiceError::Internal(format!("ecdh key error: {e}")))?;
    server_ec
        .public_key()
        .to_bytes(&group, openssl::ec::PointConversionForm::UNCOMPRESSED, &mut ctx)
        .map_err(|e| ServiceError::Internal(format!("ecdh encode error: {e}")))
}
