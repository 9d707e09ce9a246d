//! Relationship remapper: rewrites raw relationship endpoints to canonical
//! ids, drops already-seen rows, and emits one provenance row per newly
//! admitted raw relationship.
//!
//! Weight and doc_count are not computed here; the gateway recomputes them
//! from the provenance table after the rows land, which is what keeps
//! repeated runs from inflating them.

use std::collections::{HashMap, HashSet};

use crate::ident::resolved_relationship_id;
use crate::mention::RawRelationship;
use crate::resolved::{RelationshipProvenance, ResolvedRelationship};

#[derive(Debug, Default)]
pub struct RemapOutput {
    /// Base rows for the triples touched this run, deduplicated by
    /// `resolved_rel_id`, first/last seen folded across the batch.
    pub relationships: Vec<ResolvedRelationship>,
    /// One row per newly admitted raw relationship; never one for a
    /// duplicate.
    pub provenance: Vec<RelationshipProvenance>,
    /// Raw rows discarded because a prior run already recorded them.
    pub duplicates_skipped: usize,
    /// Endpoints that had no mapping and passed through on their raw id.
    pub unmapped_endpoints: usize,
}

/// Remaps a batch of raw relationships onto canonical triples.
///
/// `entity_map` is the full resolution mapping (raw entity id to canonical
/// id); `seen` holds every raw relationship id that already has a
/// provenance row. An endpoint missing from the map falls back to its raw
/// id, so a relationship is never dropped just because one side resolved to
/// nothing.
#[must_use]
pub fn remap_relationships(
    raw: &[RawRelationship],
    entity_map: &HashMap<String, String>,
    seen: &HashSet<String>,
) -> RemapOutput {
    let mut out = RemapOutput::default();
    let mut triples: HashMap<String, ResolvedRelationship> = HashMap::new();

    for rel in raw {
        if seen.contains(&rel.relationship_id) {
            out.duplicates_skipped += 1;
            continue;
        }

        let subject = map_endpoint(entity_map, &rel.subject_entity_id, &mut out);
        let object = map_endpoint(entity_map, &rel.object_entity_id, &mut out);

        let resolved_rel_id = resolved_relationship_id(&subject, &rel.predicate, &object);

        let entry = triples
            .entry(resolved_rel_id.clone())
            .or_insert_with(|| ResolvedRelationship {
                resolved_rel_id: resolved_rel_id.clone(),
                subject_resolved_id: subject,
                predicate: rel.predicate.clone(),
                object_resolved_id: object,
                weight: 0,
                doc_count: 0,
                first_seen_at: rel.created_at,
                last_seen_at: rel.created_at,
            });
        entry.first_seen_at = match (entry.first_seen_at, rel.created_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        entry.last_seen_at = match (entry.last_seen_at, rel.created_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        out.provenance.push(RelationshipProvenance {
            resolved_rel_id,
            relationship_id: rel.relationship_id.clone(),
            document_id: rel.document_id.clone(),
            chunk_id: rel.chunk_id,
            context: rel.context.clone(),
            page: rel.page,
        });
    }

    let mut relationships: Vec<ResolvedRelationship> = triples.into_values().collect();
    relationships.sort_by(|a, b| a.resolved_rel_id.cmp(&b.resolved_rel_id));
    out.relationships = relationships;
    out
}

fn map_endpoint(
    entity_map: &HashMap<String, String>,
    raw_id: &str,
    out: &mut RemapOutput,
) -> String {
    entity_map.get(raw_id).cloned().unwrap_or_else(|| {
        out.unmapped_endpoints += 1;
        tracing::warn!(entity_id = raw_id, "endpoint has no resolution mapping, passing raw id through");
        raw_id.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn two_raw_rows_collapse_onto_one_triple() {
        let entity_map = map(&[("e1", "res::a"), ("e2", "res::b")]);
        let raw = vec![
            RawRelationship::new("r1", "e1", "works_at", "e2", "doc1"),
            RawRelationship::new("r2", "e1", "works_at", "e2", "doc2"),
        ];

        let out = remap_relationships(&raw, &entity_map, &HashSet::new());

        assert_eq!(out.relationships.len(), 1);
        assert_eq!(out.provenance.len(), 2);
        assert_eq!(out.duplicates_skipped, 0);
        assert_eq!(out.relationships[0].subject_resolved_id, "res::a");
        assert_eq!(out.relationships[0].object_resolved_id, "res::b");
    }

    #[test]
    fn already_seen_rows_are_discarded_before_aggregation() {
        let entity_map = map(&[("e1", "res::a"), ("e2", "res::b")]);
        let raw = vec![
            RawRelationship::new("r1", "e1", "works_at", "e2", "doc1"),
            RawRelationship::new("r2", "e1", "works_at", "e2", "doc2"),
        ];
        let seen: HashSet<String> = ["r1".to_string()].into();

        let out = remap_relationships(&raw, &entity_map, &seen);

        assert_eq!(out.duplicates_skipped, 1);
        assert_eq!(out.provenance.len(), 1);
        assert_eq!(out.provenance[0].relationship_id, "r2");
    }

    #[test]
    fn fully_seen_batch_produces_nothing() {
        let entity_map = map(&[("e1", "res::a"), ("e2", "res::b")]);
        let raw = vec![RawRelationship::new("r1", "e1", "works_at", "e2", "doc1")];
        let seen: HashSet<String> = ["r1".to_string()].into();

        let out = remap_relationships(&raw, &entity_map, &seen);

        assert!(out.relationships.is_empty());
        assert!(out.provenance.is_empty());
        assert_eq!(out.duplicates_skipped, 1);
    }

    #[test]
    fn unmapped_endpoint_passes_through_raw_id() {
        let entity_map = map(&[("e1", "res::a")]);
        let raw = vec![RawRelationship::new("r1", "e1", "mentions", "ghost", "doc1")];

        let out = remap_relationships(&raw, &entity_map, &HashSet::new());

        assert_eq!(out.relationships.len(), 1);
        assert_eq!(out.relationships[0].object_resolved_id, "ghost");
        assert_eq!(out.unmapped_endpoints, 1);
    }

    #[test]
    fn first_and_last_seen_fold_across_the_batch() {
        use chrono::{TimeZone, Utc};
        let entity_map = map(&[("e1", "res::a"), ("e2", "res::b")]);
        let early = Utc.timestamp_opt(100, 0).single().expect("timestamp");
        let late = Utc.timestamp_opt(200, 0).single().expect("timestamp");
        let raw = vec![
            RawRelationship::new("r1", "e1", "works_at", "e2", "doc1").with_created_at(late),
            RawRelationship::new("r2", "e1", "works_at", "e2", "doc2").with_created_at(early),
        ];

        let out = remap_relationships(&raw, &entity_map, &HashSet::new());

        assert_eq!(out.relationships[0].first_seen_at, Some(early));
        assert_eq!(out.relationships[0].last_seen_at, Some(late));
    }
}
