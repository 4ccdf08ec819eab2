use std::collections::HashMap;

use crate::model::Attributes;

/// A selector `S` matches attributes `A` iff `S` is non-empty AND every
/// `(k, v)` in `S` is present in `A` with exact string equality (§4.10).
/// Empty selectors never match.
pub fn matches(selector: &HashMap<String, String>, attributes: &Attributes) -> bool {
    if selector.is_empty() {
        return false;
    }
    selector
        .iter()
        .all(|(k, v)| attributes.get(k).is_some_and(|existing| existing == v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn selector(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_selector_never_matches() {
        let a = attrs(&[("env", "prod")]);
        assert!(!matches(&HashMap::new(), &a));
    }

    #[test]
    fn requires_all_keys_present_and_equal() {
        let sel = selector(&[("env", "prod"), ("region", "us-east")]);
        assert!(matches(&sel, &attrs(&[("env", "prod"), ("region", "us-east")])));
        assert!(!matches(&sel, &attrs(&[("env", "prod"), ("region", "eu-west")])));
        assert!(!matches(&sel, &attrs(&[("env", "prod")])));
    }
}
