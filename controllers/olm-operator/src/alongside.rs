//! Installed-alongside annotations
//!
//! Objects created for an operator record which CSV they were installed
//! alongside. Each reference is stored under its own key
//! `operatorframework.io/installed-alongside-<hash>` with the value
//! `namespace/name`; the hash is derived from the value so the same CSV
//! always maps to the same key.

use crds::NamespacedName;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

pub const ANNOTATION_PREFIX: &str = "operatorframework.io/installed-alongside-";

/// Annotation key for `reference`: the prefix plus 16 hex digits of the
/// sha256 of `namespace/name`.
pub fn annotation_key(reference: &NamespacedName) -> String {
    let digest = Sha256::digest(reference.to_string().as_bytes());
    let hash: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{ANNOTATION_PREFIX}{hash}")
}

/// Encodes references as annotations.
pub fn to_annotations<'a>(references: impl IntoIterator<Item = &'a NamespacedName>) -> BTreeMap<String, String> {
    references
        .into_iter()
        .map(|r| (annotation_key(r), r.to_string()))
        .collect()
}

/// Decodes the references recorded in `annotations`, sorted.
///
/// Entries whose value does not parse, or whose key does not match the
/// hash of the value, are ignored.
pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Vec<NamespacedName> {
    let mut references: Vec<NamespacedName> = annotations
        .iter()
        .filter(|(key, _)| key.starts_with(ANNOTATION_PREFIX))
        .filter_map(|(key, value)| match value.parse::<NamespacedName>() {
            Ok(reference) if annotation_key(&reference) == *key => Some(reference),
            Ok(_) => {
                debug!("Ignoring {}: key does not match value {}", key, value);
                None
            }
            Err(e) => {
                debug!("Ignoring {}: {}", key, e);
                None
            }
        })
        .collect();
    references.sort();
    references.dedup();
    references
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn fixtures() -> Vec<NamespacedName> {
        let mut refs = Vec::new();
        for ns in ["operators", "openshift-operators", "team-a", "team-b", "default"] {
            for csv in [
                "etcdoperator.v0.6.1",
                "etcdoperator.v0.9.0",
                "etcdoperator.v0.9.2",
                "etcdoperator.v0.9.4",
                "prometheusoperator.0.47.0",
                "cert-manager.v1.14.0",
            ] {
                refs.push(NamespacedName::new(ns, csv));
            }
        }
        refs
    }

    #[test]
    fn test_round_trip() {
        let refs = vec![
            NamespacedName::new("operators", "etcdoperator.v0.9.4"),
            NamespacedName::new("team-a", "cert-manager.v1.14.0"),
        ];
        let annotations = to_annotations(&refs);
        assert_eq!(annotations.len(), 2);
        assert!(annotations.keys().all(|k| k.starts_with(ANNOTATION_PREFIX)));
        assert_eq!(from_annotations(&annotations), refs);
    }

    #[test]
    fn test_keys_do_not_collide_on_fixtures() {
        let refs = fixtures();
        let keys: BTreeSet<String> = refs.iter().map(annotation_key).collect();
        assert_eq!(keys.len(), refs.len());
        // Kubernetes annotation name segments are limited to 63 characters.
        assert!(keys.iter().all(|k| k.split_once('/').unwrap().1.len() <= 63));
    }

    #[test]
    fn test_unrelated_and_tampered_annotations_are_ignored() {
        let good = NamespacedName::new("operators", "etcdoperator.v0.9.4");
        let mut annotations = to_annotations([&good]);
        annotations.insert("kubectl.kubernetes.io/last-applied-configuration".to_string(), "{}".to_string());
        annotations.insert(format!("{ANNOTATION_PREFIX}0000000000000000"), "operators/other".to_string());
        annotations.insert(format!("{ANNOTATION_PREFIX}garbage"), "not-a-reference".to_string());

        assert_eq!(from_annotations(&annotations), vec![good]);
    }

    fn reference() -> impl Strategy<Value = NamespacedName> {
        ("[a-z0-9]([-a-z0-9]{0,14}[a-z0-9])?", "[a-z0-9]([-a-z0-9.]{0,30}[a-z0-9])?")
            .prop_map(|(namespace, name)| NamespacedName::new(namespace, name))
    }

    /// A set of references together with the same references in random order.
    fn shuffled_references() -> impl Strategy<Value = (BTreeSet<NamespacedName>, Vec<NamespacedName>)> {
        prop::collection::btree_set(reference(), 0..16).prop_flat_map(|set| {
            let listed: Vec<NamespacedName> = set.iter().cloned().collect();
            (Just(set), Just(listed).prop_shuffle())
        })
    }

    proptest! {
        #[test]
        fn test_any_reference_set_survives_encoding((set, shuffled) in shuffled_references()) {
            let annotations = to_annotations(&shuffled);
            prop_assert_eq!(annotations.len(), set.len());

            let decoded = from_annotations(&annotations);
            prop_assert_eq!(decoded, set.into_iter().collect::<Vec<_>>());
        }
    }
}
