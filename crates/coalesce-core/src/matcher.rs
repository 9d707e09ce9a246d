//! Matching strategies and the blocker.
//!
//! A strategy assigns every mention a blocking key (or excludes it); the
//! blocker then partitions the batch by key. Strategies are interchangeable
//! behind [`MatchStrategy`] and selected through [`MatcherConfig`]; all of
//! them honor the same mentions-in, keys-out contract, so the resolver and
//! remapper never care which one ran.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mention::EntityMention;
use crate::normalize::{normalize_name, normalized_key, NameClass};

pub trait MatchStrategy: Send + Sync {
    /// Strategy label recorded on every mapping row it produces.
    fn name(&self) -> &'static str;

    /// Confidence recorded on every mapping row it produces.
    fn confidence(&self) -> f64;

    /// One blocking key per mention, parallel to the input; `None` excludes
    /// the mention from canonicalization.
    fn assign_keys(&self, mentions: &[EntityMention]) -> Vec<Option<String>>;
}

/// v1 strategy: pure exact blocking on the normalized key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactNormalizedMatcher;

impl MatchStrategy for ExactNormalizedMatcher {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn confidence(&self) -> f64 {
        1.0
    }

    fn assign_keys(&self, mentions: &[EntityMention]) -> Vec<Option<String>> {
        mentions
            .iter()
            .map(|m| {
                let normalized =
                    normalize_name(&m.name, NameClass::from_type(&m.entity_type));
                let key = normalized_key(&m.entity_type, &normalized);
                if key.is_empty() { None } else { Some(key) }
            })
            .collect()
    }
}

/// Roadmap strategy: exact blocking, then keys of the same type whose
/// normalized names are within a Jaro-Winkler threshold collapse onto one
/// representative key.
///
/// Representative selection is deterministic: distinct keys are visited in
/// sorted order and each key maps to the representative of the first
/// earlier key it clears the threshold against, so the outcome does not
/// depend on batch order.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyNormalizedMatcher {
    threshold: f64,
}

impl FuzzyNormalizedMatcher {
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for FuzzyNormalizedMatcher {
    fn default() -> Self {
        Self::new(0.93)
    }
}

impl MatchStrategy for FuzzyNormalizedMatcher {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn confidence(&self) -> f64 {
        self.threshold
    }

    fn assign_keys(&self, mentions: &[EntityMention]) -> Vec<Option<String>> {
        let exact = ExactNormalizedMatcher.assign_keys(mentions);

        let mut distinct: Vec<&str> = exact.iter().flatten().map(String::as_str).collect();
        distinct.sort_unstable();
        distinct.dedup();

        // representative key per distinct key, resolved in sorted order
        let mut representative: HashMap<&str, &str> = HashMap::new();
        for i in 0..distinct.len() {
            let key = distinct[i];
            let (key_type, key_name) = split_key(key);
            let mut chosen = key;
            for &earlier in &distinct[..i] {
                let (other_type, other_name) = split_key(earlier);
                if key_type == other_type
                    && strsim::jaro_winkler(key_name, other_name) >= self.threshold
                {
                    chosen = representative[earlier];
                    break;
                }
            }
            representative.insert(key, chosen);
        }

        exact
            .iter()
            .map(|k| {
                k.as_deref()
                    .map(|key| representative[key].to_string())
            })
            .collect()
    }
}

fn split_key(key: &str) -> (&str, &str) {
    key.split_once('|').unwrap_or((key, ""))
}

/// Strategy selection, the single configuration knob of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MatcherConfig {
    Exact,
    Fuzzy { threshold: f64 },
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self::Exact
    }
}

impl MatcherConfig {
    #[must_use]
    pub fn build(self) -> Box<dyn MatchStrategy> {
        match self {
            Self::Exact => Box::new(ExactNormalizedMatcher),
            Self::Fuzzy { threshold } => Box::new(FuzzyNormalizedMatcher::new(threshold)),
        }
    }
}

/// Partitions mentions by blocking key; mentions without a key are dropped
/// and counted. Pure exact blocking: no cross-key merging happens here.
#[must_use]
pub fn block(
    mentions: Vec<EntityMention>,
    keys: &[Option<String>],
) -> (HashMap<String, Vec<EntityMention>>, usize) {
    let mut groups: HashMap<String, Vec<EntityMention>> = HashMap::new();
    let mut skipped = 0;

    for (mention, key) in mentions.into_iter().zip(keys) {
        match key {
            Some(key) => groups.entry(key.clone()).or_default().push(mention),
            None => skipped += 1,
        }
    }

    (groups, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(id: &str, name: &str, entity_type: &str, doc: &str) -> EntityMention {
        EntityMention::new(id, name, entity_type, doc)
    }

    #[test]
    fn exact_matcher_groups_suffix_variants() {
        let mentions = vec![
            mention("e1", "Apple Inc.", "organization", "doc1"),
            mention("e2", "apple inc", "organization", "doc2"),
            mention("e3", "Apple", "organization", "doc3"),
        ];
        let keys = ExactNormalizedMatcher.assign_keys(&mentions);
        assert!(keys.iter().all(|k| k.as_deref() == Some("organization|apple")));

        let (groups, skipped) = block(mentions, &keys);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["organization|apple"].len(), 3);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn exact_matcher_keeps_types_apart() {
        let mentions = vec![
            mention("e1", "Amazon", "organization", "doc1"),
            mention("e2", "Amazon", "location", "doc1"),
        ];
        let keys = ExactNormalizedMatcher.assign_keys(&mentions);
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn exact_matcher_excludes_empty_names() {
        let mentions = vec![
            mention("e1", "???", "person", "doc1"),
            mention("e2", "Alice", "person", "doc1"),
        ];
        let keys = ExactNormalizedMatcher.assign_keys(&mentions);
        assert_eq!(keys[0], None);
        assert!(keys[1].is_some());

        let (groups, skipped) = block(mentions, &keys);
        assert_eq!(groups.len(), 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn fuzzy_matcher_merges_near_identical_names() {
        let mentions = vec![
            mention("e1", "Jonathan Smithers", "person", "doc1"),
            mention("e2", "Jonathan Smither", "person", "doc2"),
        ];
        let keys = FuzzyNormalizedMatcher::new(0.9).assign_keys(&mentions);
        assert_eq!(keys[0], keys[1]);
    }

    #[test]
    fn fuzzy_matcher_never_merges_across_types() {
        let mentions = vec![
            mention("e1", "Amazon", "organization", "doc1"),
            mention("e2", "Amazon", "location", "doc1"),
        ];
        let keys = FuzzyNormalizedMatcher::new(0.5).assign_keys(&mentions);
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn fuzzy_matcher_is_batch_order_independent() {
        let a = mention("e1", "Acme Widgets", "organization", "doc1");
        let b = mention("e2", "Acme Widget", "organization", "doc2");

        let forward = FuzzyNormalizedMatcher::new(0.9).assign_keys(&[a.clone(), b.clone()]);
        let reverse = FuzzyNormalizedMatcher::new(0.9).assign_keys(&[b, a]);
        assert_eq!(forward[0], reverse[1]);
        assert_eq!(forward[1], reverse[0]);
    }

    #[test]
    fn matcher_config_builds_selected_strategy() {
        assert_eq!(MatcherConfig::default().build().name(), "exact");
        assert_eq!(MatcherConfig::Fuzzy { threshold: 0.9 }.build().name(), "fuzzy");
    }
}
