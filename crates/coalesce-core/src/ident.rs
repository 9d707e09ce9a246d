//! Deterministic identifiers for canonical records.
//!
//! Ids are content-addressed: the same logical identity hashes to the same
//! id in any process, in any run order. There is no id-generation service
//! and nothing is random or auto-incremented.

use sha2::{Digest, Sha256};

const SHORT_HASH_LEN: usize = 16;

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(SHORT_HASH_LEN);
    hex
}

/// Canonical entity id for a normalized key (`type|normalized_name`).
#[must_use]
pub fn resolved_entity_id(normalized_key: &str) -> String {
    format!("res::{}", short_hash(normalized_key))
}

/// Canonical relationship id for a remapped triple.
#[must_use]
pub fn resolved_relationship_id(
    subject_resolved_id: &str,
    predicate: &str,
    object_resolved_id: &str,
) -> String {
    format!(
        "rel::{}",
        short_hash(&format!(
            "{subject_resolved_id}|{predicate}|{object_resolved_id}"
        ))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_stable() {
        let a = resolved_entity_id("organization|apple");
        let b = resolved_entity_id("organization|apple");
        assert_eq!(a, b);
        assert!(a.starts_with("res::"));
        assert_eq!(a.len(), "res::".len() + SHORT_HASH_LEN);
    }

    #[test]
    fn entity_id_is_type_scoped() {
        // same name, different type, never the same canonical identity
        assert_ne!(
            resolved_entity_id("organization|amazon"),
            resolved_entity_id("location|amazon")
        );
    }

    #[test]
    fn relationship_id_depends_on_all_three_parts() {
        let base = resolved_relationship_id("res::a", "works_at", "res::b");
        assert_eq!(base, resolved_relationship_id("res::a", "works_at", "res::b"));
        assert_ne!(base, resolved_relationship_id("res::b", "works_at", "res::a"));
        assert_ne!(base, resolved_relationship_id("res::a", "founded", "res::b"));
        assert!(base.starts_with("rel::"));
    }
}
