//! Canonical resolver: turns one normalization group into one
//! [`ResolvedEntity`] plus its per-mention mapping rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ident::resolved_entity_id;
use crate::matcher::MatchStrategy;
use crate::mention::EntityMention;
use crate::resolved::{ResolutionMapping, ResolvedEntity};

/// Most frequent raw name in the group; ties broken by longer string, then
/// earliest first-seen mention, then lexicographically. The chain is total,
/// so the choice never depends on batch or iteration order.
#[must_use]
pub fn choose_primary_name(mentions: &[EntityMention]) -> String {
    let mut freq: HashMap<&str, (usize, Option<DateTime<Utc>>)> = HashMap::new();
    for m in mentions {
        if m.name.is_empty() {
            continue;
        }
        let entry = freq.entry(m.name.as_str()).or_insert((0, None));
        entry.0 += 1;
        entry.1 = match (entry.1, m.created_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    let mut candidates: Vec<(&str, usize, Option<DateTime<Utc>>)> =
        freq.into_iter().map(|(name, (n, seen))| (name, n, seen)).collect();

    candidates.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.0.len().cmp(&a.0.len()))
            .then_with(|| match (a.2, b.2) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.0.cmp(b.0))
    });

    candidates.first().map(|(name, _, _)| (*name).to_string()).unwrap_or_default()
}

/// Builds the canonical record for one group. Counts are computed over the
/// given mentions, which the service has already merged with the full
/// historical set for this key, so re-runs never double-count.
#[must_use]
pub fn build_resolved_entity(normalized_key: &str, group: &[EntityMention]) -> ResolvedEntity {
    let entity_type = normalized_key.split('|').next().unwrap_or_default();

    let mut docs: Vec<&str> = group.iter().map(|m| m.document_id.as_str()).collect();
    docs.sort_unstable();
    docs.dedup();

    let now = Utc::now();
    ResolvedEntity {
        resolved_id: resolved_entity_id(normalized_key),
        primary_name: choose_primary_name(group),
        normalized_key: normalized_key.to_string(),
        entity_type: entity_type.to_string(),
        category: choose_category(group),
        mention_count: group.len() as i64,
        doc_count: docs.len() as i64,
        created_at: now,
        updated_at: now,
    }
}

/// One mapping row per mention in the group, labeled with the strategy that
/// produced the grouping.
#[must_use]
pub fn build_mappings(
    normalized_key: &str,
    group: &[EntityMention],
    strategy: &dyn MatchStrategy,
) -> Vec<ResolutionMapping> {
    let resolved_id = resolved_entity_id(normalized_key);
    group
        .iter()
        .map(|m| ResolutionMapping {
            entity_id: m.entity_id.clone(),
            resolved_id: resolved_id.clone(),
            strategy: strategy.name().to_string(),
            confidence: strategy.confidence(),
            normalized_key: normalized_key.to_string(),
            document_id: Some(m.document_id.clone()),
        })
        .collect()
}

/// Category of the earliest mention, ties broken by entity id.
fn choose_category(group: &[EntityMention]) -> String {
    group
        .iter()
        .min_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.entity_id.cmp(&b.entity_id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.entity_id.cmp(&b.entity_id),
        })
        .map(|m| m.category.clone())
        .unwrap_or_else(|| "general".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mention_at(id: &str, name: &str, doc: &str, secs: i64) -> EntityMention {
        EntityMention::new(id, name, "organization", doc)
            .with_created_at(Utc.timestamp_opt(secs, 0).single().expect("timestamp"))
    }

    #[test]
    fn primary_name_prefers_most_frequent() {
        let group = vec![
            mention_at("e1", "Apple Inc.", "d1", 1),
            mention_at("e2", "Apple Inc.", "d2", 2),
            mention_at("e3", "Apple", "d3", 3),
        ];
        assert_eq!(choose_primary_name(&group), "Apple Inc.");
    }

    #[test]
    fn primary_name_tie_breaks_on_length_then_first_seen() {
        let group = vec![
            mention_at("e1", "Apple", "d1", 5),
            mention_at("e2", "Apple Inc.", "d2", 9),
        ];
        // equal frequency, longer string wins
        assert_eq!(choose_primary_name(&group), "Apple Inc.");

        let group = vec![
            mention_at("e1", "Apfel", "d1", 9),
            mention_at("e2", "Apple", "d2", 5),
        ];
        // equal frequency and length, earlier first-seen wins
        assert_eq!(choose_primary_name(&group), "Apple");
    }

    #[test]
    fn primary_name_is_order_independent() {
        let a = mention_at("e1", "Apple", "d1", 5);
        let b = mention_at("e2", "Apple Inc.", "d2", 9);
        assert_eq!(
            choose_primary_name(&[a.clone(), b.clone()]),
            choose_primary_name(&[b, a])
        );
    }

    #[test]
    fn resolved_entity_counts_mentions_and_distinct_docs() {
        let group = vec![
            mention_at("e1", "Apple Inc.", "d1", 1),
            mention_at("e2", "apple inc", "d2", 2),
            mention_at("e3", "Apple", "d2", 3),
        ];
        let entity = build_resolved_entity("organization|apple", &group);
        assert_eq!(entity.mention_count, 3);
        assert_eq!(entity.doc_count, 2);
        assert_eq!(entity.entity_type, "organization");
        assert_eq!(entity.resolved_id, resolved_entity_id("organization|apple"));
    }

    #[test]
    fn mappings_carry_strategy_and_document() {
        let group = vec![mention_at("e1", "Apple", "d1", 1)];
        let rows = build_mappings(
            "organization|apple",
            &group,
            &crate::matcher::ExactNormalizedMatcher,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].strategy, "exact");
        assert!((rows[0].confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(rows[0].document_id.as_deref(), Some("d1"));
    }
}
