use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use fleet_common::{
    db::Database,
    ids::{ConfigId, TokenId},
    model::{BootstrapToken, Config},
};
use rand::RngCore;

use super::{
    ServiceError,
    error::NotFoundContext,
    signing::{SigningKey, TokenPayload},
};

const ID_BYTES: usize = 6;
const SECRET_BYTES: usize = 26;

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct TokenService {
    db: Arc<Database>,
    signing_key: Arc<SigningKey>,
}

impl TokenService {
    pub fn new(db: Arc<Database>, signing_key: Arc<SigningKey>) -> Self {
        Self { db, signing_key }
    }

    /// Generates 32 random bytes, splits into a 6-byte id and 26-byte
    /// secret, stores the record keyed by `hex(id)`. If `config_reference`
    /// is supplied, snapshots the referenced config's bytes into the
    /// bootstrap-config store under the composite key `hex(id).hex(secret)`
    /// (the full bearer token).
    pub fn create_token(
        &self,
        ttl_seconds: i64,
        labels: HashMap<String, String>,
        config_reference: Option<ConfigId>,
    ) -> Result<BootstrapToken, ServiceError> {
        if ttl_seconds <= 0 {
            return Err(ServiceError::InvalidArgument("ttl must be positive".into()));
        }

        let mut raw = [0u8; ID_BYTES + SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let id = TokenId(hex_encode(&raw[..ID_BYTES]));
        let secret = hex_encode(&raw[ID_BYTES..]);

        let token = BootstrapToken {
            id: id.clone(),
            secret,
            expiry: Utc::now() + Duration::seconds(ttl_seconds),
            labels,
            config_reference: config_reference.clone(),
        };

        if let Some(config_id) = &config_reference {
            let config: Config = self
                .db
                .configs
                .get(config_id.as_str())
                .or_not_found(format!("config not found: {config_id}"))?;
            self.db
                .bootstrap_configs
                .put(&token.bearer(), &config)
                .map_err(ServiceError::from_storage)?;
        }

        self.db
            .tokens
            .put(id.as_str(), &token)
            .map_err(ServiceError::from_storage)?;
        Ok(token)
    }

    /// Lists all tokens; enqueues async deletion for any whose expiry is in
    /// the past; returns the list unfiltered (callers may momentarily see
    /// expired entries).
    pub fn list_tokens(&self) -> Vec<BootstrapToken> {
        let now = Utc::now();
        let all: Vec<BootstrapToken> = self.db.tokens.list().into_iter().map(|(_, t)| t).collect();
        let expired: Vec<TokenId> = all
            .iter()
            .filter(|t| t.is_expired(now))
            .map(|t| t.id.clone())
            .collect();
        if !expired.is_empty() {
            let db = Arc::clone(&self.db);
            tokio::spawn(async move {
                for id in expired {
                    if let Err(e) = db.tokens.delete(id.as_str()) {
                        tracing::warn!(token_id = %id, error = %e, "failed to garbage-collect expired token");
                    }
                }
            });
        }
        all
    }

    pub fn delete_token(&self, id: &TokenId) -> Result<(), ServiceError> {
        self.db
            .tokens
            .delete(id.as_str())
            .map_err(ServiceError::from_storage)?;
        Ok(())
    }

    /// Produces a detached JWS signature over `json(id, secret)` per token,
    /// using the server's private key. Used by agents to prove the server's
    /// identity during bootstrap.
    pub fn signatures(&self) -> Result<HashMap<String, String>, ServiceError> {
        let mut out = HashMap::new();
        for (_, token) in self.db.tokens.list() {
            let payload = TokenPayload {
                id: token.id.as_str().to_owned(),
                secret: token.secret.clone(),
            };
            if let Some(signature) = self.signing_key.sign(&payload)? {
                out.insert(token.id.as_str().to_owned(), signature);
            }
        }
        Ok(out)
    }
}
