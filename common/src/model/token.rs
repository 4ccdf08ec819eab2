use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConfigId, TokenId};

/// `id.secret` is the full bearer credential; `id` alone is the public
/// handle used as the storage key and in `ListTokens`/`Signatures` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapToken {
    pub id: TokenId,
    pub secret: String,
    pub expiry: DateTime<Utc>,
    pub labels: HashMap<String, String>,
    pub config_reference: Option<ConfigId>,
}

impl BootstrapToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// The full bearer token string handed to the agent.
    pub fn bearer(&self) -> String {
        format!("{}.{}", self.id.as_str(), self.secret)
    }
}
