//! Entity resolution core.
//!
//! Deduplicates entity mentions scattered across ingested documents into
//! stable canonical identities and remaps raw relationships onto them,
//! keeping per-mention provenance. Safe to re-run as new documents arrive:
//! canonical ids are deterministic, every write is an idempotent upsert,
//! and counters are recomputed from source rather than incremented.

pub mod error;
pub mod ident;
pub mod matcher;
pub mod mention;
pub mod normalize;
pub mod remap;
pub mod resolve;
pub mod resolved;
pub mod service;
pub mod storage;

pub use error::{Error, Result};
pub use ident::{resolved_entity_id, resolved_relationship_id};
pub use matcher::{
    ExactNormalizedMatcher, FuzzyNormalizedMatcher, MatchStrategy, MatcherConfig,
};
pub use mention::{EntityMention, RawRelationship, ResolutionFilter};
pub use normalize::{normalize_name, normalized_key, NameClass, RULESET_VERSION};
pub use resolved::{
    RelationshipProvenance, ResolutionMapping, ResolvedEntity, ResolvedRelationship,
};
pub use service::{Phase, ResolutionService, ResolutionStats, RunMode};
pub use storage::{
    GraphEdge, GraphNode, GraphSnapshot, MentionSource, RelationshipSource, Store,
};
