use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    scope::Visibility,
    storage::{
        db::SurrealDbClient,
        types::{
            chunk::Chunk,
            entity::{entity_id, normalize_name, Entity, ExtractedEntity},
        },
    },
};

/// A chunk reached via shared-entity expansion, not the original hybrid search.
pub struct ExpandedChunk {
    pub chunk: Chunk,
    pub shared_entity_count: usize,
    pub entity_names: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EntityFilters {
    pub entity_type: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityCount {
    pub entity: Entity,
    pub mention_count: u64,
}

/// Backs entity-linking and graph expansion. When graph support is disabled
/// or the backing store is unreachable, implementations must degrade to
/// empty results rather than raising — the retrieval pipeline treats an
/// absent graph as "no expansion available", not a failure.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn link_chunk_entities(
        &self,
        chunk_id: &str,
        entities: &[ExtractedEntity],
    ) -> Result<usize, AppError>;
    async fn expand_by_shared_entities(
        &self,
        seed_chunk_ids: &[String],
        visibility: &Visibility,
        limit: usize,
    ) -> Result<Vec<ExpandedChunk>, AppError>;
    async fn top_entities(&self, filters: &EntityFilters) -> Result<Vec<EntityCount>, AppError>;
    async fn chunks_for_entity(&self, entity_id: &str) -> Result<Vec<String>, AppError>;
    async fn entities_for_document(&self, doc_id: &str) -> Result<Vec<Entity>, AppError>;
}

/// Always-empty `GraphStore`, used when `graph_enabled = false`.
pub struct NullGraphStore;

#[async_trait]
impl GraphStore for NullGraphStore {
    async fn link_chunk_entities(
        &self,
        _chunk_id: &str,
        _entities: &[ExtractedEntity],
    ) -> Result<usize, AppError> {
        Ok(0)
    }

    async fn expand_by_shared_entities(
        &self,
        _seed_chunk_ids: &[String],
        _visibility: &Visibility,
        _limit: usize,
    ) -> Result<Vec<ExpandedChunk>, AppError> {
        Ok(Vec::new())
    }

    async fn top_entities(&self, _filters: &EntityFilters) -> Result<Vec<EntityCount>, AppError> {
        Ok(Vec::new())
    }

    async fn chunks_for_entity(&self, _entity_id: &str) -> Result<Vec<String>, AppError> {
        Ok(Vec::new())
    }

    async fn entities_for_document(&self, _doc_id: &str) -> Result<Vec<Entity>, AppError> {
        Ok(Vec::new())
    }
}

pub struct SurrealGraphStore {
    db: SurrealDbClient,
}

impl SurrealGraphStore {
    pub fn new(db: SurrealDbClient) -> Self {
        Self { db }
    }

    fn mention_edge_id(chunk_id: &str, entity_id: &str) -> String {
        format!("{chunk_id}_{entity_id}")
    }
}

#[derive(Debug, Deserialize)]
struct ExpansionRow {
    chunk_id: surrealdb::sql::Thing,
    shared: Vec<surrealdb::sql::Thing>,
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    async fn link_chunk_entities(
        &self,
        chunk_id: &str,
        entities: &[ExtractedEntity],
    ) -> Result<usize, AppError> {
        let mut linked = 0;
        for raw in entities {
            let normalized = normalize_name(&raw.name);
            if normalized.is_empty() {
                continue;
            }
            let ent_id = entity_id(&normalized, &raw.entity_type);
            let edge_id = Self::mention_edge_id(chunk_id, &ent_id);

            self.db
                .client
                .query(
                    r#"
                    BEGIN TRANSACTION;
                    LET $chunk_node = type::thing('chunk', $chunk_id);
                    LET $entity_node = type::thing('entity', $entity_id);
                    LET $edge = type::thing('mentions', $edge_id);
                    UPSERT $entity_node MERGE {
                        name: $name,
                        entity_type: $entity_type,
                        updated_at: time::now()
                    };
                    DELETE $edge;
                    RELATE $chunk_node->$edge->$entity_node;
                    COMMIT TRANSACTION;
                    "#,
                )
                .bind(("entity_id", ent_id))
                .bind(("name", normalized))
                .bind(("entity_type", raw.entity_type.clone()))
                .bind(("edge_id", edge_id))
                .bind(("chunk_id", chunk_id.to_string()))
                .await?
                .check()?;
            linked += 1;
        }
        Ok(linked)
    }

    async fn expand_by_shared_entities(
        &self,
        seed_chunk_ids: &[String],
        visibility: &Visibility,
        limit: usize,
    ) -> Result<Vec<ExpandedChunk>, AppError> {
        if seed_chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let seeds: Vec<surrealdb::sql::Thing> = seed_chunk_ids
            .iter()
            .map(|id| surrealdb::sql::Thing::from(("chunk", id.as_str())))
            .collect();

        let mut seed_entity_response = self
            .db
            .client
            .query("SELECT VALUE out FROM mentions WHERE in IN $seeds")
            .bind(("seeds", seeds.clone()))
            .await?;
        let seed_entities: Vec<surrealdb::sql::Thing> =
            seed_entity_response.take(0).unwrap_or_default();
        if seed_entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = self
            .db
            .client
            .query(
                "SELECT in AS chunk_id, array::distinct(out) AS shared FROM mentions \
                 WHERE out IN $seed_entities AND in NOT IN $seeds \
                 GROUP BY in",
            )
            .bind(("seed_entities", seed_entities))
            .bind(("seeds", seeds))
            .await?;

        let rows: Vec<ExpansionRow> = response.take(0).unwrap_or_default();

        let mut expanded = Vec::new();
        for row in rows {
            let chunk_id = row.chunk_id.id.to_raw();
            let chunk = self
                .db
                .get_item::<crate::storage::types::chunk::Chunk>(&chunk_id)
                .await?;
            let Some(chunk) = chunk else { continue };
            if !visibility.allows(&chunk.scope_key) {
                continue;
            }
            let mut entity_names = Vec::new();
            for ent_id in &row.shared {
                if let Some(entity) = self
                    .db
                    .get_item::<Entity>(&ent_id.id.to_raw())
                    .await?
                {
                    entity_names.push(entity.name);
                }
            }
            expanded.push(ExpandedChunk {
                chunk,
                shared_entity_count: entity_names.len(),
                entity_names,
            });
        }

        expanded.sort_by(|a, b| b.shared_entity_count.cmp(&a.shared_entity_count));
        expanded.truncate(limit);
        Ok(expanded)
    }

    async fn top_entities(&self, filters: &EntityFilters) -> Result<Vec<EntityCount>, AppError> {
        let entities: Vec<Entity> = self.db.get_all_stored_items::<Entity>().await?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entity in &entities {
            let mut response = self
                .db
                .client
                .query("SELECT count() AS c FROM mentions WHERE out = type::thing('entity', $id) GROUP ALL")
                .bind(("id", entity.id.clone()))
                .await?;
            #[derive(Deserialize)]
            struct Count {
                c: u64,
            }
            let count: Option<Count> = response.take(0).unwrap_or_default();
            counts.insert(entity.id.clone(), count.map(|c| c.c).unwrap_or(0));
        }

        let mut rows: Vec<EntityCount> = entities
            .into_iter()
            .filter(|e| {
                filters
                    .entity_type
                    .as_ref()
                    .is_none_or(|t| &e.entity_type == t)
            })
            .map(|e| {
                let mention_count = counts.get(&e.id).copied().unwrap_or(0);
                EntityCount { entity: e, mention_count }
            })
            .collect();

        rows.sort_by(|a, b| b.mention_count.cmp(&a.mention_count));
        if filters.limit > 0 {
            rows.truncate(filters.limit);
        }
        Ok(rows)
    }

    async fn chunks_for_entity(&self, entity_id: &str) -> Result<Vec<String>, AppError> {
        let mut response = self
            .db
            .client
            .query("SELECT VALUE in FROM mentions WHERE out = type::thing('entity', $id)")
            .bind(("id", entity_id.to_string()))
            .await?;
        let things: Vec<surrealdb::sql::Thing> = response.take(0).unwrap_or_default();
        Ok(things.into_iter().map(|t| t.id.to_raw()).collect())
    }

    async fn entities_for_document(&self, doc_id: &str) -> Result<Vec<Entity>, AppError> {
        let mut response = self
            .db
            .client
            .query(
                "SELECT VALUE out FROM mentions \
                 WHERE in IN (SELECT VALUE id FROM chunk WHERE doc_id = $doc_id)",
            )
            .bind(("doc_id", doc_id.to_string()))
            .await?;
        let things: Vec<surrealdb::sql::Thing> = response.take(0).unwrap_or_default();
        let mut entities = Vec::with_capacity(things.len());
        for thing in things {
            if let Some(entity) = self.db.get_item::<Entity>(&thing.id.to_raw()).await? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeKey;
    use crate::storage::types::chunk::Chunk;
    use uuid::Uuid;

    async fn store() -> SurrealGraphStore {
        let db = SurrealDbClient::memory("graph_test", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.build_indexes().await.expect("indexes");
        SurrealGraphStore::new(db)
    }

    fn chunk(doc_id: &str, text: &str) -> Chunk {
        Chunk::new(
            doc_id.into(),
            ScopeKey::tenant("t1"),
            0,
            text.len(),
            vec![1],
            "title".into(),
            "section".into(),
            "summary".into(),
            "why".into(),
            text.into(),
        )
    }

    #[tokio::test]
    async fn link_then_expand_finds_shared_entity_chunks() {
        let store = store().await;
        let chunk_a = chunk("doc-1", "Ada Lovelace wrote the first algorithm");
        let chunk_b = chunk("doc-1", "Ada Lovelace collaborated with Babbage");
        store.db.store_item(chunk_a.clone()).await.unwrap();
        store.db.store_item(chunk_b.clone()).await.unwrap();

        let entities = vec![ExtractedEntity {
            name: "Ada Lovelace".into(),
            entity_type: "person".into(),
        }];
        store.link_chunk_entities(&chunk_a.id, &entities).await.unwrap();
        store.link_chunk_entities(&chunk_b.id, &entities).await.unwrap();

        let visibility = Visibility::new("t1", None, None);
        let expanded = store
            .expand_by_shared_entities(&[chunk_a.id.clone()], &visibility, 10)
            .await
            .unwrap();

        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].chunk.id, chunk_b.id);
        assert_eq!(expanded[0].shared_entity_count, 1);
    }

    #[tokio::test]
    async fn linking_is_idempotent() {
        let store = store().await;
        let chunk_a = chunk("doc-1", "Grace Hopper invented the compiler");
        store.db.store_item(chunk_a.clone()).await.unwrap();

        let entities = vec![ExtractedEntity {
            name: "Grace Hopper".into(),
            entity_type: "person".into(),
        }];
        store.link_chunk_entities(&chunk_a.id, &entities).await.unwrap();
        store.link_chunk_entities(&chunk_a.id, &entities).await.unwrap();

        let all_entities = store.db.get_all_stored_items::<Entity>().await.unwrap();
        assert_eq!(all_entities.len(), 1);
    }

    #[tokio::test]
    async fn null_graph_store_always_returns_empty() {
        let store = NullGraphStore;
        let visibility = Visibility::new("t1", None, None);
        assert!(store
            .expand_by_shared_entities(&["c1".into()], &visibility, 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .link_chunk_entities("c1", &[ExtractedEntity { name: "x".into(), entity_type: "y".into() }])
                .await
                .unwrap(),
            0
        );
    }
}
