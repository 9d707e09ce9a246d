use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One raw occurrence of an entity name, as produced by ingestion.
/// Read-only from the resolver's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub entity_id: String,
    pub name: String,
    pub entity_type: String,
    pub category: String,
    pub document_id: String,
    pub chunk_id: Option<i64>,
    pub page: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl EntityMention {
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            category: "general".into(),
            document_id: document_id.into(),
            chunk_id: None,
            page: None,
            created_at: Some(Utc::now()),
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub const fn with_chunk(mut self, chunk_id: i64) -> Self {
        self.chunk_id = Some(chunk_id);
        self
    }

    #[must_use]
    pub const fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub const fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// One raw fact occurrence extracted from a document, endpoints still
/// pointing at mention-level entity ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRelationship {
    pub relationship_id: String,
    pub subject_entity_id: String,
    pub predicate: String,
    pub object_entity_id: String,
    pub context: Option<String>,
    pub document_id: String,
    pub chunk_id: Option<i64>,
    pub page: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RawRelationship {
    #[must_use]
    pub fn new(
        relationship_id: impl Into<String>,
        subject_entity_id: impl Into<String>,
        predicate: impl Into<String>,
        object_entity_id: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            relationship_id: relationship_id.into(),
            subject_entity_id: subject_entity_id.into(),
            predicate: predicate.into(),
            object_entity_id: object_entity_id.into(),
            context: None,
            document_id: document_id.into(),
            chunk_id: None,
            page: None,
            created_at: Some(Utc::now()),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub const fn with_chunk(mut self, chunk_id: i64) -> Self {
        self.chunk_id = Some(chunk_id);
        self
    }

    #[must_use]
    pub const fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub const fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Narrows which mention/relationship rows a resolution run loads.
///
/// An empty filter selects the whole corpus. Which dimensions are honored is
/// a capability of the source; the SQLite source supports document ids and a
/// time range and rejects tag filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionFilter {
    pub doc_ids: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ResolutionFilter {
    #[must_use]
    pub fn for_documents<I, S>(doc_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            doc_ids: Some(doc_ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Rejects filters that would select nothing or describe an empty range.
    pub fn validate(&self) -> Result<()> {
        if let Some(ids) = &self.doc_ids {
            if ids.is_empty() {
                return Err(Error::InvalidFilter("doc_ids is present but empty".into()));
            }
        }
        if let Some(tags) = &self.tags {
            if tags.is_empty() {
                return Err(Error::InvalidFilter("tags is present but empty".into()));
            }
        }
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(Error::InvalidFilter(format!(
                    "since {since} is after until {until}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_is_valid() {
        assert!(ResolutionFilter::default().validate().is_ok());
    }

    #[test]
    fn empty_doc_id_list_is_rejected() {
        let filter = ResolutionFilter {
            doc_ids: Some(vec![]),
            ..ResolutionFilter::default()
        };
        assert!(filter.validate().is_err());
    }

    #[test]
    fn inverted_time_range_is_rejected() {
        let filter = ResolutionFilter {
            since: Some(Utc::now()),
            until: Some(Utc::now() - chrono::Duration::hours(1)),
            ..ResolutionFilter::default()
        };
        assert!(filter.validate().is_err());
    }
}
