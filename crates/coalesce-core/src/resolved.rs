use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A canonical identity covering one or more mentions that share a
/// normalized key. Counts are recomputed from the mapping table at upsert
/// time, never incremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub resolved_id: String,
    pub primary_name: String,
    pub normalized_key: String,
    pub entity_type: String,
    pub category: String,
    pub mention_count: i64,
    pub doc_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row per raw mention linking it to its canonical identity, with the
/// strategy that made the call and its confidence. `document_id` is carried
/// so per-entity doc counts can be recomputed from this table alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionMapping {
    pub entity_id: String,
    pub resolved_id: String,
    pub strategy: String,
    pub confidence: f64,
    pub normalized_key: String,
    pub document_id: Option<String>,
}

/// A canonical fact: one row per distinct (subject, predicate, object)
/// triple after endpoint remapping. `weight` equals the number of distinct
/// raw relationship rows ever mapped onto the triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedRelationship {
    pub resolved_rel_id: String,
    pub subject_resolved_id: String,
    pub predicate: String,
    pub object_resolved_id: String,
    pub weight: i64,
    pub doc_count: i64,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Trace row recording which raw relationship contributed to a canonical
/// triple. Append-only; uniqueness on `relationship_id` is the re-run guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipProvenance {
    pub resolved_rel_id: String,
    pub relationship_id: String,
    pub document_id: String,
    pub chunk_id: Option<i64>,
    pub context: Option<String>,
    pub page: Option<i64>,
}
