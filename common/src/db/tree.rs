use serde::{Serialize, de::DeserializeOwned};

use crate::error::DatabaseError;

/// Strongly-typed Put/Get/List/Delete over a single `sled::Tree`. Keys and
/// values round-trip through `bincode`; a structurally equal value produces
/// byte-equal encodings on the same build, which is all this system needs
/// (only the config-map hash in `hash.rs` is required to be hash-canonical
/// across arbitrary key ordering).
pub struct DbTree<K, V> {
    tree: sled::Tree,
    _phantom: std::marker::PhantomData<(K, V)>,
}

impl<K, V> DbTree<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub fn new(tree: sled::Tree) -> Self {
        Self {
            tree,
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn get(&self, key: &K) -> Result<V, DatabaseError> {
        let key_bytes = bincode::serialize(key)?;
        match self.tree.get(key_bytes)? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(DatabaseError::NotFound),
        }
    }

    pub fn get_opt(&self, key: &K) -> Result<Option<V>, DatabaseError> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(DatabaseError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn put(&self, key: &K, value: &V) -> Result<(), DatabaseError> {
        let key_bytes = bincode::serialize(key)?;
        let value_bytes = bincode::serialize(value)?;
        self.tree.insert(key_bytes, value_bytes)?;
        Ok(())
    }

    pub fn delete(&self, key: &K) -> Result<bool, DatabaseError> {
        let key_bytes = bincode::serialize(key)?;
        Ok(self.tree.remove(key_bytes)?.is_some())
    }

    pub fn exists(&self, key: &K) -> Result<bool, DatabaseError> {
        let key_bytes = bincode::serialize(key)?;
        Ok(self.tree.contains_key(key_bytes)?)
    }

    /// Skips entries that fail to deserialize and logs; does not fail the
    /// call. Accepts data loss of a single unreadable record in exchange for
    /// keeping fleet-wide listings available during partial corruption.
    pub fn list(&self) -> Vec<V> {
        self.tree
            .iter()
            .filter_map(|row| {
                let (_, value_bytes) = match row {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!("error reading row from store: {e}");
                        return None;
                    }
                };
                match bincode::deserialize(&value_bytes) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::error!("error parsing value from store: {e}");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Like `DbTree` but keyed by a string id used directly as the physical key
/// (no bincode key framing). Used for the record stores that are addressed
/// by natural string/composite-string ids (`agent-id`, `{deployment}/{agent}`).
pub struct DbRecords<V> {
    tree: sled::Tree,
    _phantom: std::marker::PhantomData<V>,
}

impl<V> DbRecords<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(tree: sled::Tree) -> Self {
        Self {
            tree,
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn get(&self, key: &str) -> Result<V, DatabaseError> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(DatabaseError::NotFound),
        }
    }

    pub fn get_opt(&self, key: &str) -> Result<Option<V>, DatabaseError> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(DatabaseError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn put(&self, key: &str, value: &V) -> Result<(), DatabaseError> {
        let value_bytes = bincode::serialize(value)?;
        self.tree.insert(key.as_bytes(), value_bytes)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<bool, DatabaseError> {
        Ok(self.tree.remove(key.as_bytes())?.is_some())
    }

    pub fn exists(&self, key: &str) -> Result<bool, DatabaseError> {
        Ok(self.tree.contains_key(key.as_bytes())?)
    }

    pub fn list(&self) -> Vec<(String, V)> {
        self.tree
            .iter()
            .filter_map(|row| {
                let (key_bytes, value_bytes) = match row {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!("error reading row from store: {e}");
                        return None;
                    }
                };
                let key = match std::str::from_utf8(&key_bytes) {
                    Ok(k) => k.to_owned(),
                    Err(e) => {
                        tracing::error!("error parsing key from store: {e}");
                        return None;
                    }
                };
                match bincode::deserialize(&value_bytes) {
                    Ok(value) => Some((key, value)),
                    Err(e) => {
                        tracing::error!("error parsing value from store: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn list_with_prefix(&self, prefix: &str) -> Vec<(String, V)> {
        self.tree
            .scan_prefix(prefix.as_bytes())
            .filter_map(|row| {
                let (key_bytes, value_bytes) = match row {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!("error reading row from store: {e}");
                        return None;
                    }
                };
                let key = match std::str::from_utf8(&key_bytes) {
                    Ok(k) => k.to_owned(),
                    Err(e) => {
                        tracing::error!("error parsing key from store: {e}");
                        return None;
                    }
                };
                match bincode::deserialize(&value_bytes) {
                    Ok(value) => Some((key, value)),
                    Err(e) => {
                        tracing::error!("error parsing value from store: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn delete_with_prefix(&self, prefix: &str) -> Result<usize, DatabaseError> {
        let keys: Vec<_> = self
            .tree
            .scan_prefix(prefix.as_bytes())
            .keys()
            .filter_map(|k| k.ok())
            .collect();
        let mut removed = 0;
        for key in keys {
            if self.tree.remove(key)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        count: u32,
    }

    fn temp_tree() -> sled::Tree {
        let db = sled::Config::new().temporary(true).open().unwrap();
        db.open_tree("widgets").unwrap()
    }

    #[test]
    fn round_trips_and_reports_not_found() {
        let records: DbRecords<Widget> = DbRecords::new(temp_tree());
        assert!(matches!(records.get("a"), Err(DatabaseError::NotFound)));
        records.put("a", &Widget { count: 3 }).unwrap();
        assert_eq!(records.get("a").unwrap(), Widget { count: 3 });
        assert!(records.delete("a").unwrap());
        assert!(matches!(records.get("a"), Err(DatabaseError::NotFound)));
    }

    #[test]
    fn list_skips_corrupt_entries() {
        let tree = temp_tree();
        let records: DbRecords<Widget> = DbRecords::new(tree.clone());
        records.put("a", &Widget { count: 1 }).unwrap();
        tree.insert("b", b"not bincode".as_slice()).unwrap();
        let listed = records.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "a");
    }
}
