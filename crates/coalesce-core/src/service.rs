//! Resolution service: runs the phases of one resolution pass in order and
//! reports statistics.
//!
//! The service is a single-writer batch job. Callers serialize concurrent
//! invocations; recovery from a failed or interrupted run is re-invoking
//! `resolve` with the same filter, which converges because every write
//! underneath is an idempotent upsert.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use crate::matcher::{block, ExactNormalizedMatcher, MatchStrategy};
use crate::mention::{EntityMention, ResolutionFilter};
use crate::remap::remap_relationships;
use crate::resolve::{build_mappings, build_resolved_entity};
use crate::storage::{MentionSource, RelationshipSource, Store};
use crate::Result;

/// Phases of one run, strictly sequential. A failed run reports the phase
/// it died in; completed phases stay durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    LoadingMentions,
    Grouping,
    ResolvingEntities,
    PersistingEntities,
    RemappingRelationships,
    PersistingRelationships,
    Done,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingMentions => "loading_mentions",
            Self::Grouping => "grouping",
            Self::ResolvingEntities => "resolving_entities",
            Self::PersistingEntities => "persisting_entities",
            Self::RemappingRelationships => "remapping_relationships",
            Self::PersistingRelationships => "persisting_relationships",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Incremental` runs with the caller's filter as given; `Full` clears the
/// narrowing and re-resolves the whole corpus. The algorithm is identical
/// either way, which is what makes the two converge to the same end state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    Full,
    #[default]
    Incremental,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionStats {
    pub mentions_loaded: usize,
    pub groups: usize,
    pub entities_upserted: u64,
    pub mappings_upserted: u64,
    pub relationships_upserted: u64,
    pub provenance_inserted: u64,
    /// Mentions excluded because their name normalized to nothing, plus
    /// rows skipped for malformed fields.
    pub mentions_skipped: usize,
    /// Raw relationships discarded by the idempotency guard.
    pub relationships_deduplicated: usize,
    /// Relationship endpoints that passed through on their raw id.
    pub unmapped_endpoints: usize,
    pub phase_timings_ms: Vec<(Phase, u64)>,
}

pub struct ResolutionService<'a> {
    store: &'a Store,
    mentions: &'a dyn MentionSource,
    relationships: &'a dyn RelationshipSource,
    matcher: Box<dyn MatchStrategy>,
}

impl<'a> ResolutionService<'a> {
    /// Service reading mentions and relationships from the store's own
    /// source tables, matching with the exact strategy.
    #[must_use]
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            mentions: store,
            relationships: store,
            matcher: Box::new(ExactNormalizedMatcher),
        }
    }

    /// Swaps in external input collaborators.
    #[must_use]
    pub fn with_sources(
        mut self,
        mentions: &'a dyn MentionSource,
        relationships: &'a dyn RelationshipSource,
    ) -> Self {
        self.mentions = mentions;
        self.relationships = relationships;
        self
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: Box<dyn MatchStrategy>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Runs one resolution pass. Returns complete stats or an error naming
    /// the failing phase; it never reports a silently incomplete success.
    pub async fn resolve(
        &self,
        filter: &ResolutionFilter,
        mode: RunMode,
    ) -> Result<ResolutionStats> {
        filter.validate()?;

        let effective = match mode {
            RunMode::Incremental => filter.clone(),
            RunMode::Full => ResolutionFilter::default(),
        };

        let mut stats = ResolutionStats::default();
        let mut clock = PhaseClock::new();

        // Load mentions
        let mut mentions = self
            .mentions
            .load_mentions(&effective)
            .await
            .map_err(|e| e.in_phase(Phase::LoadingMentions))?;
        stats.mentions_skipped += drop_malformed_mentions(&mut mentions);
        stats.mentions_loaded = mentions.len();
        clock.lap(Phase::LoadingMentions, &mut stats);

        if mentions.is_empty() {
            tracing::info!("no mentions matched the filter, nothing to resolve");
            return Ok(stats);
        }

        // Group by blocking key
        let keys = self.matcher.assign_keys(&mentions);
        for (mention, key) in mentions.iter().zip(&keys) {
            if key.is_none() {
                tracing::warn!(
                    entity_id = %mention.entity_id,
                    name = %mention.name,
                    "name normalized to empty, excluded from canonicalization"
                );
            }
        }
        let (groups, skipped) = block(mentions, &keys);
        stats.mentions_skipped += skipped;
        stats.groups = groups.len();
        clock.lap(Phase::Grouping, &mut stats);

        // Resolve canonical entities over current batch plus history
        let groups = self
            .merge_history(groups)
            .await
            .map_err(|e| e.in_phase(Phase::ResolvingEntities))?;

        let mut entities = Vec::with_capacity(groups.len());
        let mut mappings = Vec::new();
        for (key, group) in &groups {
            entities.push(build_resolved_entity(key, group));
            mappings.extend(build_mappings(key, group, self.matcher.as_ref()));
        }
        entities.sort_by(|a, b| a.resolved_id.cmp(&b.resolved_id));
        clock.lap(Phase::ResolvingEntities, &mut stats);

        // Persist entities and mapping (first durable checkpoint)
        let (entities_upserted, mappings_upserted) = self
            .store
            .commit_entities(&entities, &mappings)
            .await
            .map_err(|e| e.in_phase(Phase::PersistingEntities))?;
        stats.entities_upserted = entities_upserted;
        stats.mappings_upserted = mappings_upserted;
        clock.lap(Phase::PersistingEntities, &mut stats);

        // Remap relationships against the now-durable mapping
        let raw = self
            .relationships
            .load_relationships(&effective)
            .await
            .map_err(|e| e.in_phase(Phase::RemappingRelationships))?;
        let entity_map = self
            .store
            .entity_map()
            .await
            .map_err(|e| e.in_phase(Phase::RemappingRelationships))?;
        let seen = self
            .store
            .seen_relationship_ids()
            .await
            .map_err(|e| e.in_phase(Phase::RemappingRelationships))?;

        let remapped = remap_relationships(&raw, &entity_map, &seen);
        stats.relationships_deduplicated = remapped.duplicates_skipped;
        stats.unmapped_endpoints = remapped.unmapped_endpoints;
        clock.lap(Phase::RemappingRelationships, &mut stats);

        // Persist relationships and provenance (second durable checkpoint)
        let (relationships_upserted, provenance_inserted) = self
            .store
            .commit_relationships(&remapped.relationships, &remapped.provenance)
            .await
            .map_err(|e| e.in_phase(Phase::PersistingRelationships))?;
        stats.relationships_upserted = relationships_upserted;
        stats.provenance_inserted = provenance_inserted;
        clock.lap(Phase::PersistingRelationships, &mut stats);

        tracing::info!(
            mentions = stats.mentions_loaded,
            groups = stats.groups,
            entities = stats.entities_upserted,
            mappings = stats.mappings_upserted,
            relationships = stats.relationships_upserted,
            provenance = stats.provenance_inserted,
            skipped = stats.mentions_skipped,
            "resolution run complete"
        );

        Ok(stats)
    }

    /// Extends each group with every historical mention already mapped to
    /// its canonical id, deduplicated by entity id, so primary names and
    /// counts are computed over the full set rather than the batch.
    async fn merge_history(
        &self,
        groups: HashMap<String, Vec<EntityMention>>,
    ) -> Result<HashMap<String, Vec<EntityMention>>> {
        let key_by_rid: HashMap<String, String> = groups
            .keys()
            .map(|key| (crate::ident::resolved_entity_id(key), key.clone()))
            .collect();

        let rids: Vec<String> = key_by_rid.keys().cloned().collect();
        let history = self.store.mentions_for_resolved(&rids).await?;

        let mut merged: HashMap<String, HashMap<String, EntityMention>> = groups
            .into_iter()
            .map(|(key, group)| {
                let by_id = group
                    .into_iter()
                    .map(|m| (m.entity_id.clone(), m))
                    .collect();
                (key, by_id)
            })
            .collect();

        for (rid, mention) in history {
            if let Some(key) = key_by_rid.get(&rid) {
                if let Some(by_id) = merged.get_mut(key) {
                    by_id.entry(mention.entity_id.clone()).or_insert(mention);
                }
            }
        }

        Ok(merged
            .into_iter()
            .map(|(key, by_id)| {
                let mut group: Vec<EntityMention> = by_id.into_values().collect();
                group.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
                (key, group)
            })
            .collect())
    }
}

/// Drops rows that cannot participate at all (no entity id or type),
/// logging each one. Returns how many were dropped.
fn drop_malformed_mentions(mentions: &mut Vec<EntityMention>) -> usize {
    let before = mentions.len();
    mentions.retain(|m| {
        let ok = !m.entity_id.trim().is_empty() && !m.entity_type.trim().is_empty();
        if !ok {
            tracing::warn!(
                entity_id = %m.entity_id,
                name = %m.name,
                "skipping mention with missing id or type"
            );
        }
        ok
    });
    before - mentions.len()
}

struct PhaseClock {
    started: Instant,
}

impl PhaseClock {
    fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn lap(&mut self, phase: Phase, stats: &mut ResolutionStats) {
        let elapsed = self.started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
        stats.phase_timings_ms.push((phase, elapsed));
        self.started = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_names() {
        assert_eq!(Phase::LoadingMentions.to_string(), "loading_mentions");
        assert_eq!(Phase::PersistingRelationships.to_string(), "persisting_relationships");
    }

    #[test]
    fn malformed_mentions_are_dropped_not_fatal() {
        let mut mentions = vec![
            EntityMention::new("e1", "Alice", "person", "doc1"),
            EntityMention::new("", "Bob", "person", "doc1"),
            EntityMention::new("e3", "Carol", " ", "doc1"),
        ];
        let dropped = drop_malformed_mentions(&mut mentions);
        assert_eq!(dropped, 2);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].entity_id, "e1");
    }
}
