use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Wire-level `{filename -> {body, content_type}}` envelope, shaped like
/// `opamp_client::opamp::proto::AgentConfigMap`. Hashing operates on this,
/// never on the stored `Config` bytes directly, so a config can be wrapped
/// under different filenames/content-types without changing identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConfigMap {
    pub files: BTreeMap<String, AgentConfigFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfigFile {
    pub body: Vec<u8>,
    pub content_type: String,
}

impl AgentConfigMap {
    pub fn single(filename: impl Into<String>, body: Vec<u8>, content_type: impl Into<String>) -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            filename.into(),
            AgentConfigFile {
                body,
                content_type: content_type.into(),
            },
        );
        Self { files }
    }
}

/// Canonical config hash (§4.4): SHA-256 over `filename_bytes || body_bytes`
/// for each file in lexicographic filename order. `content_type` is
/// intentionally excluded. An empty map hashes to an empty byte string
/// (sentinel meaning "no config").
pub fn canonical_hash(config_map: &AgentConfigMap) -> Vec<u8> {
    if config_map.files.is_empty() {
        return Vec::new();
    }
    let mut hasher = Sha256::new();
    // BTreeMap already iterates in sorted key order.
    for (filename, file) in &config_map.files {
        hasher.update(filename.as_bytes());
        hasher.update(&file.body);
    }
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_hashes_to_empty() {
        assert!(canonical_hash(&AgentConfigMap::default()).is_empty());
    }

    #[test]
    fn hash_is_pure_and_repeatable() {
        let map = AgentConfigMap::single("config.yaml", b"receivers:\n  otlp:\n".to_vec(), "text/yaml");
        let a = canonical_hash(&map);
        let b = canonical_hash(&map);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn content_type_does_not_affect_hash() {
        let a = AgentConfigMap::single("config.yaml", b"same".to_vec(), "text/yaml");
        let b = AgentConfigMap::single("config.yaml", b"same".to_vec(), "application/x-yaml");
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn key_order_does_not_affect_hash() {
        let mut one = BTreeMap::new();
        one.insert(
            "a.yaml".to_string(),
            AgentConfigFile { body: b"a".to_vec(), content_type: "text/yaml".into() },
        );
        one.insert(
            "b.yaml".to_string(),
            AgentConfigFile { body: b"b".to_vec(), content_type: "text/yaml".into() },
        );
        let map_one = AgentConfigMap { files: one };

        let mut two = BTreeMap::new();
        two.insert(
            "b.yaml".to_string(),
            AgentConfigFile { body: b"b".to_vec(), content_type: "text/yaml".into() },
        );
        two.insert(
            "a.yaml".to_string(),
            AgentConfigFile { body: b"a".to_vec(), content_type: "text/yaml".into() },
        );
        let map_two = AgentConfigMap { files: two };

        assert_eq!(canonical_hash(&map_one), canonical_hash(&map_two));
    }

    #[test]
    fn different_bodies_hash_differently() {
        let a = AgentConfigMap::single("config.yaml", b"one".to_vec(), "text/yaml");
        let b = AgentConfigMap::single("config.yaml", b"two".to_vec(), "text/yaml");
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }
}
