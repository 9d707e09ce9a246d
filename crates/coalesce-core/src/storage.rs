//! SQLite persistence gateway.
//!
//! Reads the ingestion-owned source tables (`entities`, `relationships`)
//! and owns the four result tables. Every write is an idempotent upsert
//! guarded by a uniqueness constraint, and the two phase commits run as two
//! transactions, so re-invoking a run after a crash converges instead of
//! duplicating.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::mention::{EntityMention, RawRelationship, ResolutionFilter};
use crate::resolved::{
    RelationshipProvenance, ResolutionMapping, ResolvedEntity, ResolvedRelationship,
};
use crate::{Error, Result};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    entity_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    document_id TEXT NOT NULL,
    chunk_id INTEGER,
    page INTEGER,
    created_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_entities_document ON entities(document_id);

CREATE TABLE IF NOT EXISTS relationships (
    relationship_id TEXT PRIMARY KEY,
    subject_entity_id TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object_entity_id TEXT NOT NULL,
    context TEXT,
    document_id TEXT NOT NULL,
    chunk_id INTEGER,
    page INTEGER,
    created_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_relationships_document ON relationships(document_id);

CREATE TABLE IF NOT EXISTS resolved_entities (
    resolved_id TEXT PRIMARY KEY,
    primary_name TEXT NOT NULL,
    normalized_key TEXT NOT NULL,
    type TEXT NOT NULL,
    category TEXT NOT NULL,
    mention_count INTEGER NOT NULL DEFAULT 0,
    doc_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(normalized_key, type)
);

CREATE TABLE IF NOT EXISTS entity_resolution_map (
    entity_id TEXT PRIMARY KEY,
    resolved_id TEXT NOT NULL,
    strategy TEXT NOT NULL,
    confidence REAL NOT NULL,
    normalized_key TEXT NOT NULL,
    document_id TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_map_resolved ON entity_resolution_map(resolved_id);

CREATE TABLE IF NOT EXISTS resolved_relationships (
    resolved_rel_id TEXT PRIMARY KEY,
    subject_resolved_id TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object_resolved_id TEXT NOT NULL,
    weight INTEGER NOT NULL DEFAULT 0,
    doc_count INTEGER NOT NULL DEFAULT 0,
    first_seen_at TEXT,
    last_seen_at TEXT,
    UNIQUE(subject_resolved_id, predicate, object_resolved_id)
);

CREATE TABLE IF NOT EXISTS relationship_provenance (
    resolved_rel_id TEXT NOT NULL,
    relationship_id TEXT NOT NULL UNIQUE,
    document_id TEXT NOT NULL,
    chunk_id INTEGER,
    context TEXT,
    page INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_provenance_rel ON relationship_provenance(resolved_rel_id);
"#;

/// Read-only mention feed, filterable by documents and time range.
#[async_trait]
pub trait MentionSource: Send + Sync {
    async fn load_mentions(&self, filter: &ResolutionFilter) -> Result<Vec<EntityMention>>;
}

/// Read-only raw relationship feed, filterable like the mention feed.
#[async_trait]
pub trait RelationshipSource: Send + Sync {
    async fn load_relationships(&self, filter: &ResolutionFilter)
        -> Result<Vec<RawRelationship>>;
}

pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    // Ingestion-side helpers. The resolver never calls these; they exist for
    // the ingestion collaborator and for tests seeding source rows.

    pub async fn insert_mention(&self, mention: &EntityMention) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entities (entity_id, name, type, category, document_id, chunk_id, page, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&mention.entity_id)
        .bind(&mention.name)
        .bind(&mention.entity_type)
        .bind(&mention.category)
        .bind(&mention.document_id)
        .bind(mention.chunk_id)
        .bind(mention.page)
        .bind(mention.created_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_raw_relationship(&self, rel: &RawRelationship) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO relationships (relationship_id, subject_entity_id, predicate, object_entity_id, context, document_id, chunk_id, page, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rel.relationship_id)
        .bind(&rel.subject_entity_id)
        .bind(&rel.predicate)
        .bind(&rel.object_entity_id)
        .bind(&rel.context)
        .bind(&rel.document_id)
        .bind(rel.chunk_id)
        .bind(rel.page)
        .bind(rel.created_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Resolution-side reads

    /// Full raw-to-canonical map, for endpoint remapping.
    pub async fn entity_map(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT entity_id, resolved_id FROM entity_resolution_map")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    /// Every raw relationship id that already has a provenance row. These
    /// are discarded on re-runs before aggregation.
    pub async fn seen_relationship_ids(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT relationship_id FROM relationship_provenance")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// All historical mentions currently mapped to the given canonical ids,
    /// so primary names and counts can be refreshed over the full set
    /// rather than just the current batch.
    pub async fn mentions_for_resolved(
        &self,
        resolved_ids: &[String],
    ) -> Result<Vec<(String, EntityMention)>> {
        if resolved_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; resolved_ids.len()].join(",");
        let sql = format!(
            r#"
            SELECT m.resolved_id, e.entity_id, e.name, e.type, e.category,
                   e.document_id, e.chunk_id, e.page, e.created_at
            FROM entity_resolution_map m
            JOIN entities e ON e.entity_id = m.entity_id
            WHERE m.resolved_id IN ({placeholders})
            "#
        );

        let mut query = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                String,
                String,
                Option<i64>,
                Option<i64>,
                Option<String>,
            ),
        >(&sql);
        for id in resolved_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(resolved_id, entity_id, name, entity_type, category, document_id, chunk_id, page, created_at)| {
                (
                    resolved_id,
                    EntityMention {
                        entity_id,
                        name,
                        entity_type,
                        category,
                        document_id,
                        chunk_id,
                        page,
                        created_at: parse_optional_timestamp(created_at.as_deref()),
                    },
                )
            })
            .collect())
    }

    // Checkpoint 1: canonical entities and the mention mapping

    /// Upserts entities and mapping rows and recomputes entity counters
    /// from the mapping table, all in one transaction.
    pub async fn commit_entities(
        &self,
        entities: &[ResolvedEntity],
        mappings: &[ResolutionMapping],
    ) -> Result<(u64, u64)> {
        let mut tx = self.pool.begin().await?;

        let mut entities_upserted = 0;
        for entity in entities {
            let result = sqlx::query(
                r#"
                INSERT INTO resolved_entities (resolved_id, primary_name, normalized_key, type, category, mention_count, doc_count, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(resolved_id) DO UPDATE SET
                    primary_name = excluded.primary_name,
                    category = excluded.category,
                    mention_count = excluded.mention_count,
                    doc_count = excluded.doc_count,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&entity.resolved_id)
            .bind(&entity.primary_name)
            .bind(&entity.normalized_key)
            .bind(&entity.entity_type)
            .bind(&entity.category)
            .bind(entity.mention_count)
            .bind(entity.doc_count)
            .bind(entity.created_at.to_rfc3339())
            .bind(entity.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            entities_upserted += result.rows_affected();
        }

        // Insert-only under exact matching: an existing row is overwritten
        // only when the new strategy is strictly more confident.
        let mut mappings_upserted = 0;
        for mapping in mappings {
            let result = sqlx::query(
                r#"
                INSERT INTO entity_resolution_map (entity_id, resolved_id, strategy, confidence, normalized_key, document_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(entity_id) DO UPDATE SET
                    resolved_id = excluded.resolved_id,
                    strategy = excluded.strategy,
                    confidence = excluded.confidence,
                    normalized_key = excluded.normalized_key,
                    document_id = excluded.document_id
                WHERE excluded.confidence > entity_resolution_map.confidence
                "#,
            )
            .bind(&mapping.entity_id)
            .bind(&mapping.resolved_id)
            .bind(&mapping.strategy)
            .bind(mapping.confidence)
            .bind(&mapping.normalized_key)
            .bind(&mapping.document_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
            mappings_upserted += result.rows_affected();
        }

        let touched: Vec<&str> = entities.iter().map(|e| e.resolved_id.as_str()).collect();
        if !touched.is_empty() {
            let placeholders = vec!["?"; touched.len()].join(",");
            let sql = format!(
                r#"
                UPDATE resolved_entities
                SET mention_count = (
                        SELECT COUNT(*) FROM entity_resolution_map m
                        WHERE m.resolved_id = resolved_entities.resolved_id
                    ),
                    doc_count = (
                        SELECT COUNT(DISTINCT m.document_id) FROM entity_resolution_map m
                        WHERE m.resolved_id = resolved_entities.resolved_id
                    )
                WHERE resolved_id IN ({placeholders})
                "#
            );
            let mut query = sqlx::query(&sql);
            for id in &touched {
                query = query.bind(id);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok((entities_upserted, mappings_upserted))
    }

    // Checkpoint 2: canonical relationships and provenance

    /// Upserts triple base rows, appends provenance for newly admitted raw
    /// relationships, and recomputes weight/doc_count from provenance, all
    /// in one transaction.
    pub async fn commit_relationships(
        &self,
        relationships: &[ResolvedRelationship],
        provenance: &[RelationshipProvenance],
    ) -> Result<(u64, u64)> {
        let mut tx = self.pool.begin().await?;

        let mut relationships_upserted = 0;
        for rel in relationships {
            let result = sqlx::query(
                r#"
                INSERT INTO resolved_relationships (resolved_rel_id, subject_resolved_id, predicate, object_resolved_id, first_seen_at, last_seen_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(resolved_rel_id) DO UPDATE SET
                    first_seen_at = MIN(
                        COALESCE(resolved_relationships.first_seen_at, excluded.first_seen_at),
                        COALESCE(excluded.first_seen_at, resolved_relationships.first_seen_at)
                    ),
                    last_seen_at = MAX(
                        COALESCE(resolved_relationships.last_seen_at, excluded.last_seen_at),
                        COALESCE(excluded.last_seen_at, resolved_relationships.last_seen_at)
                    )
                "#,
            )
            .bind(&rel.resolved_rel_id)
            .bind(&rel.subject_resolved_id)
            .bind(&rel.predicate)
            .bind(&rel.object_resolved_id)
            .bind(rel.first_seen_at.map(|t| t.to_rfc3339()))
            .bind(rel.last_seen_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
            relationships_upserted += result.rows_affected();
        }

        let mut provenance_inserted = 0;
        for row in provenance {
            let result = sqlx::query(
                r#"
                INSERT INTO relationship_provenance (resolved_rel_id, relationship_id, document_id, chunk_id, context, page, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(relationship_id) DO NOTHING
                "#,
            )
            .bind(&row.resolved_rel_id)
            .bind(&row.relationship_id)
            .bind(&row.document_id)
            .bind(row.chunk_id)
            .bind(&row.context)
            .bind(row.page)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
            provenance_inserted += result.rows_affected();
        }

        let touched: Vec<&str> = relationships
            .iter()
            .map(|r| r.resolved_rel_id.as_str())
            .collect();
        if !touched.is_empty() {
            let placeholders = vec!["?"; touched.len()].join(",");
            let sql = format!(
                r#"
                UPDATE resolved_relationships
                SET weight = (
                        SELECT COUNT(*) FROM relationship_provenance p
                        WHERE p.resolved_rel_id = resolved_relationships.resolved_rel_id
                    ),
                    doc_count = (
                        SELECT COUNT(DISTINCT p.document_id) FROM relationship_provenance p
                        WHERE p.resolved_rel_id = resolved_relationships.resolved_rel_id
                    )
                WHERE resolved_rel_id IN ({placeholders})
                "#
            );
            let mut query = sqlx::query(&sql);
            for id in &touched {
                query = query.bind(id);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok((relationships_upserted, provenance_inserted))
    }

    // Lookups for the graph/provenance consumers and tests

    pub async fn get_resolved_entity(&self, resolved_id: &str) -> Result<ResolvedEntity> {
        let row: ResolvedEntityRow = sqlx::query_as(
            r#"
            SELECT resolved_id, primary_name, normalized_key, type, category, mention_count, doc_count, created_at, updated_at
            FROM resolved_entities WHERE resolved_id = ?
            "#,
        )
        .bind(resolved_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::EntityNotFound(resolved_id.to_string()))?;

        parse_resolved_entity_row(row)
    }

    pub async fn find_resolved_by_key(&self, normalized_key: &str) -> Result<Option<ResolvedEntity>> {
        let row: Option<ResolvedEntityRow> = sqlx::query_as(
            r#"
            SELECT resolved_id, primary_name, normalized_key, type, category, mention_count, doc_count, created_at, updated_at
            FROM resolved_entities WHERE normalized_key = ?
            "#,
        )
        .bind(normalized_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_resolved_entity_row).transpose()
    }

    pub async fn list_resolved_entities(&self) -> Result<Vec<ResolvedEntity>> {
        let rows: Vec<ResolvedEntityRow> = sqlx::query_as(
            r#"
            SELECT resolved_id, primary_name, normalized_key, type, category, mention_count, doc_count, created_at, updated_at
            FROM resolved_entities ORDER BY primary_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_resolved_entity_row).collect()
    }

    pub async fn get_resolved_relationship(
        &self,
        resolved_rel_id: &str,
    ) -> Result<ResolvedRelationship> {
        let row: ResolvedRelationshipRow = sqlx::query_as(
            r#"
            SELECT resolved_rel_id, subject_resolved_id, predicate, object_resolved_id, weight, doc_count, first_seen_at, last_seen_at
            FROM resolved_relationships WHERE resolved_rel_id = ?
            "#,
        )
        .bind(resolved_rel_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::RelationshipNotFound(resolved_rel_id.to_string()))?;

        Ok(parse_resolved_relationship_row(row))
    }

    pub async fn list_resolved_relationships(&self) -> Result<Vec<ResolvedRelationship>> {
        let rows: Vec<ResolvedRelationshipRow> = sqlx::query_as(
            r#"
            SELECT resolved_rel_id, subject_resolved_id, predicate, object_resolved_id, weight, doc_count, first_seen_at, last_seen_at
            FROM resolved_relationships ORDER BY resolved_rel_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(parse_resolved_relationship_row).collect())
    }

    pub async fn provenance_for(
        &self,
        resolved_rel_id: &str,
    ) -> Result<Vec<RelationshipProvenance>> {
        let rows: Vec<(String, String, String, Option<i64>, Option<String>, Option<i64>)> =
            sqlx::query_as(
                r#"
                SELECT resolved_rel_id, relationship_id, document_id, chunk_id, context, page
                FROM relationship_provenance WHERE resolved_rel_id = ?
                ORDER BY relationship_id
                "#,
            )
            .bind(resolved_rel_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(resolved_rel_id, relationship_id, document_id, chunk_id, context, page)| {
                RelationshipProvenance {
                    resolved_rel_id,
                    relationship_id,
                    document_id,
                    chunk_id,
                    context,
                    page,
                }
            })
            .collect())
    }

    /// Node/edge payload for the graph consumer. With a document filter,
    /// only edges evidenced in those documents and the nodes they touch are
    /// included.
    pub async fn graph_snapshot(&self, doc_ids: Option<&[String]>) -> Result<GraphSnapshot> {
        let edges = match doc_ids {
            Some(ids) if !ids.is_empty() => {
                let placeholders = vec!["?"; ids.len()].join(",");
                let sql = format!(
                    r#"
                    SELECT DISTINCT rr.resolved_rel_id, rr.subject_resolved_id, rr.predicate, rr.object_resolved_id, rr.weight, rr.doc_count
                    FROM resolved_relationships rr
                    JOIN relationship_provenance p ON p.resolved_rel_id = rr.resolved_rel_id
                    WHERE p.document_id IN ({placeholders})
                    "#
                );
                let mut query =
                    sqlx::query_as::<_, (String, String, String, String, i64, i64)>(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query.fetch_all(&self.pool).await?
            }
            _ => {
                sqlx::query_as(
                    r#"
                    SELECT resolved_rel_id, subject_resolved_id, predicate, object_resolved_id, weight, doc_count
                    FROM resolved_relationships
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let edges: Vec<GraphEdge> = edges
            .into_iter()
            .map(|(id, source, predicate, target, weight, doc_count)| GraphEdge {
                id,
                source,
                target,
                predicate,
                weight,
                doc_count,
            })
            .collect();

        let nodes = if doc_ids.is_some() {
            let mut wanted: Vec<&str> = edges
                .iter()
                .flat_map(|e| [e.source.as_str(), e.target.as_str()])
                .collect();
            wanted.sort_unstable();
            wanted.dedup();

            if wanted.is_empty() {
                Vec::new()
            } else {
                let placeholders = vec!["?"; wanted.len()].join(",");
                let sql = format!(
                    r#"
                    SELECT resolved_id, primary_name, type, category, mention_count, doc_count
                    FROM resolved_entities WHERE resolved_id IN ({placeholders})
                    "#
                );
                let mut query =
                    sqlx::query_as::<_, (String, String, String, String, i64, i64)>(&sql);
                for id in &wanted {
                    query = query.bind(id);
                }
                query.fetch_all(&self.pool).await?
            }
        } else {
            sqlx::query_as(
                r#"
                SELECT resolved_id, primary_name, type, category, mention_count, doc_count
                FROM resolved_entities
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        };

        let nodes = nodes
            .into_iter()
            .map(|(id, label, entity_type, category, mention_count, doc_count)| GraphNode {
                id,
                label,
                entity_type,
                category,
                mention_count,
                doc_count,
            })
            .collect();

        Ok(GraphSnapshot { nodes, edges })
    }
}

#[async_trait]
impl MentionSource for Store {
    async fn load_mentions(&self, filter: &ResolutionFilter) -> Result<Vec<EntityMention>> {
        reject_tags(filter)?;

        let (clause, binds) = filter_clause(filter);
        let sql = format!(
            "SELECT entity_id, name, type, category, document_id, chunk_id, page, created_at FROM entities{clause}"
        );

        let mut query = sqlx::query_as::<
            _,
            (String, String, String, String, String, Option<i64>, Option<i64>, Option<String>),
        >(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(entity_id, name, entity_type, category, document_id, chunk_id, page, created_at)| {
                EntityMention {
                    entity_id,
                    name,
                    entity_type,
                    category,
                    document_id,
                    chunk_id,
                    page,
                    created_at: parse_optional_timestamp(created_at.as_deref()),
                }
            })
            .collect())
    }
}

#[async_trait]
impl RelationshipSource for Store {
    async fn load_relationships(
        &self,
        filter: &ResolutionFilter,
    ) -> Result<Vec<RawRelationship>> {
        reject_tags(filter)?;

        let (clause, binds) = filter_clause(filter);
        let sql = format!(
            "SELECT relationship_id, subject_entity_id, predicate, object_entity_id, context, document_id, chunk_id, page, created_at FROM relationships{clause}"
        );

        let mut query = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                Option<String>,
                String,
                Option<i64>,
                Option<i64>,
                Option<String>,
            ),
        >(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    relationship_id,
                    subject_entity_id,
                    predicate,
                    object_entity_id,
                    context,
                    document_id,
                    chunk_id,
                    page,
                    created_at,
                )| RawRelationship {
                    relationship_id,
                    subject_entity_id,
                    predicate,
                    object_entity_id,
                    context,
                    document_id,
                    chunk_id,
                    page,
                    created_at: parse_optional_timestamp(created_at.as_deref()),
                },
            )
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub entity_type: String,
    pub category: String,
    pub mention_count: i64,
    pub doc_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub predicate: String,
    pub weight: i64,
    pub doc_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

fn reject_tags(filter: &ResolutionFilter) -> Result<()> {
    if filter.tags.is_some() {
        return Err(Error::UnsupportedFilter(
            "the SQLite source does not index tags".into(),
        ));
    }
    Ok(())
}

/// WHERE clause and bind values shared by both source queries. Document ids
/// and the time range narrow the load; both source tables use the same
/// column names for them.
fn filter_clause(filter: &ResolutionFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(ids) = &filter.doc_ids {
        let placeholders = vec!["?"; ids.len()].join(",");
        conditions.push(format!("document_id IN ({placeholders})"));
        binds.extend(ids.iter().cloned());
    }
    if let Some(since) = filter.since {
        conditions.push("created_at >= ?".to_string());
        binds.push(since.to_rfc3339());
    }
    if let Some(until) = filter.until {
        conditions.push("created_at <= ?".to_string());
        binds.push(until.to_rfc3339());
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

type ResolvedEntityRow = (String, String, String, String, String, i64, i64, String, String);
type ResolvedRelationshipRow = (
    String,
    String,
    String,
    String,
    i64,
    i64,
    Option<String>,
    Option<String>,
);

fn parse_resolved_entity_row(row: ResolvedEntityRow) -> Result<ResolvedEntity> {
    let (
        resolved_id,
        primary_name,
        normalized_key,
        entity_type,
        category,
        mention_count,
        doc_count,
        created_at,
        updated_at,
    ) = row;

    Ok(ResolvedEntity {
        resolved_id,
        primary_name,
        normalized_key,
        entity_type,
        category,
        mention_count,
        doc_count,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_resolved_relationship_row(row: ResolvedRelationshipRow) -> ResolvedRelationship {
    let (
        resolved_rel_id,
        subject_resolved_id,
        predicate,
        object_resolved_id,
        weight,
        doc_count,
        first_seen_at,
        last_seen_at,
    ) = row;

    ResolvedRelationship {
        resolved_rel_id,
        subject_resolved_id,
        predicate,
        object_resolved_id,
        weight,
        doc_count,
        first_seen_at: parse_optional_timestamp(first_seen_at.as_deref()),
        last_seen_at: parse_optional_timestamp(last_seen_at.as_deref()),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::MalformedTimestamp(value.to_string()))
}

/// Timestamps on source rows are advisory; a malformed one degrades to
/// `None` with a warning instead of failing the batch.
fn parse_optional_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(_) => {
            tracing::warn!(timestamp = value, "ignoring malformed timestamp on source row");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_tables_round_trip() {
        let store = Store::open_memory().await.unwrap();

        let mention = EntityMention::new("e1", "Apple Inc.", "organization", "doc1")
            .with_chunk(3)
            .with_page(7);
        store.insert_mention(&mention).await.unwrap();

        let loaded = store
            .load_mentions(&ResolutionFilter::default())
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Apple Inc.");
        assert_eq!(loaded[0].chunk_id, Some(3));
        assert_eq!(loaded[0].page, Some(7));
    }

    #[tokio::test]
    async fn document_filter_narrows_the_load() {
        let store = Store::open_memory().await.unwrap();

        store
            .insert_mention(&EntityMention::new("e1", "Alice", "person", "doc1"))
            .await
            .unwrap();
        store
            .insert_mention(&EntityMention::new("e2", "Bob", "person", "doc2"))
            .await
            .unwrap();

        let loaded = store
            .load_mentions(&ResolutionFilter::for_documents(["doc2"]))
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].entity_id, "e2");
    }

    #[tokio::test]
    async fn tag_filter_is_rejected() {
        let store = Store::open_memory().await.unwrap();
        let filter = ResolutionFilter {
            tags: Some(vec!["finance".into()]),
            ..ResolutionFilter::default()
        };
        let result = store.load_mentions(&filter).await;
        assert!(matches!(result, Err(Error::UnsupportedFilter(_))));
    }

    #[tokio::test]
    async fn mapping_upsert_ignores_lower_confidence() {
        let store = Store::open_memory().await.unwrap();

        let exact = ResolutionMapping {
            entity_id: "e1".into(),
            resolved_id: "res::aaaa".into(),
            strategy: "exact".into(),
            confidence: 1.0,
            normalized_key: "person|alice".into(),
            document_id: Some("doc1".into()),
        };
        let (_, first) = store.commit_entities(&[], &[exact.clone()]).await.unwrap();
        assert_eq!(first, 1);

        // a weaker strategy must not reclassify the mention
        let fuzzy = ResolutionMapping {
            strategy: "fuzzy".into(),
            confidence: 0.9,
            resolved_id: "res::bbbb".into(),
            ..exact
        };
        let (_, second) = store.commit_entities(&[], &[fuzzy]).await.unwrap();
        assert_eq!(second, 0);

        let map = store.entity_map().await.unwrap();
        assert_eq!(map["e1"], "res::aaaa");
    }

    #[tokio::test]
    async fn provenance_insert_is_append_only_by_relationship_id() {
        let store = Store::open_memory().await.unwrap();

        let row = RelationshipProvenance {
            resolved_rel_id: "rel::cccc".into(),
            relationship_id: "r1".into(),
            document_id: "doc1".into(),
            chunk_id: None,
            context: None,
            page: None,
        };

        let (_, first) = store.commit_relationships(&[], &[row.clone()]).await.unwrap();
        assert_eq!(first, 1);
        let (_, second) = store.commit_relationships(&[], &[row]).await.unwrap();
        assert_eq!(second, 0);
    }
}
