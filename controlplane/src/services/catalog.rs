use std::sync::Arc;

use fleet_common::{db::Database, ids::ConfigId, model::Config};

use super::{ServiceError, error::NotFoundContext};

const DEFAULT_CONFIG_KEY: &str = "global";
const BUILTIN_DEFAULT_CONFIG: &[u8] = b"receivers:\n  otlp:\n    protocols:\n      grpc:\nexporters:\n  logging:\nservice:\n  pipelines:\n    traces:\n      receivers: [otlp]\n      exporters: [logging]\n";

/// Plain CRUD over `{config_id -> bytes}` plus a built-in fallback for the
/// global default (C6).
pub struct ConfigCatalog {
    db: Arc<Database>,
}

impl ConfigCatalog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn put_config(&self, id: &ConfigId, bytes: Vec<u8>) -> Result<Config, ServiceError> {
        if id.as_str().is_empty() {
            return Err(ServiceError::InvalidArgument("config id must be non-empty".into()));
        }
        if bytes.is_empty() {
            return Err(ServiceError::InvalidArgument("config bytes must be non-empty".into()));
        }
        let config = Config { id: id.clone(), bytes };
        self.db
            .configs
            .put(id.as_str(), &config)
            .map_err(ServiceError::from_storage)?;
        Ok(config)
    }

    pub fn get_config(&self, id: &ConfigId) -> Result<Config, ServiceError> {
        self.db
            .configs
            .get(id.as_str())
            .or_not_found(format!("config not found: {id}"))
    }

    pub fn delete_config(&self, id: &ConfigId) -> Result<(), ServiceError> {
        self.db
            .configs
            .delete(id.as_str())
            .map_err(ServiceError::from_storage)?;
        Ok(())
    }

    pub fn list_configs(&self) -> Vec<Config> {
        self.db.configs.list().into_iter().map(|(_, c)| c).collect()
    }

    pub fn get_default_config(&self) -> Config {
        self.db
            .default_configs
            .get_opt(DEFAULT_CONFIG_KEY)
            .ok()
            .flatten()
            .unwrap_or_else(|| Config {
                id: ConfigId::from(DEFAULT_CONFIG_KEY),
                bytes: BUILTIN_DEFAULT_CONFIG.to_vec(),
            })
    }

    pub fn set_default_config(&self, bytes: Vec<u8>) -> Result<Config, ServiceError> {
        if bytes.is_empty() {
            return Err(ServiceError::InvalidArgument("config bytes must be non-empty".into()));
        }
        let config = Config {
            id: ConfigId::from(DEFAULT_CONFIG_KEY),
            bytes,
        };
        self.db
            .default_configs
            .put(DEFAULT_CONFIG_KEY, &config)
            .map_err(ServiceError::from_storage)?;
        Ok(config)
    }
}
