use std::sync::Arc;

use fleet_common::{
    db::Database,
    hash::{AgentConfigMap, canonical_hash},
    ids::AgentId,
    model::Config,
};

use super::catalog::ConfigCatalog;

/// Config construction for agents (§4.13): loads `assigned-config[agent_id]`
/// if present, else the built-in default; wraps it as a single-file config
/// map and computes its canonical hash.
pub fn build_for_agent(db: &Arc<Database>, agent_id: &AgentId) -> (AgentConfigMap, Vec<u8>) {
    let config: Config = db
        .assigned_configs
        .get_opt(agent_id.as_str())
        .ok()
        .flatten()
        .unwrap_or_else(|| ConfigCatalog::new(Arc::clone(db)).get_default_config());

    let map = AgentConfigMap::single("config.yaml", config.bytes, "text/yaml");
    let hash = canonical_hash(&map);
    (map, hash)
}
