use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{de, Deserialize, Deserializer};
use surrealdb::sql::Thing;

use crate::{
    error::AppError,
    scope::Visibility,
    storage::{
        db::SurrealDbClient,
        types::{chunk::Chunk, StoredObject},
    },
};

struct FlexibleIdVisitor;

impl<'de> de::Visitor<'de> for FlexibleIdVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string or a Thing")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value)
    }

    fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        let thing = Thing::deserialize(de::value::MapAccessDeserializer::new(map))?;
        Ok(thing.id.to_raw())
    }
}

fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FlexibleIdVisitor)
}

/// A single hybrid search hit: the store-native id, the fused score in
/// `[0,1]`, and the chunk payload.
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub chunk: Chunk,
}

/// Backs hybrid (sparse+dense) search over `Chunk`s. `alpha` mixes sparse
/// (BM25) and dense (cosine/HNSW) signals: `0.0` is sparse-only, `1.0` is
/// dense-only.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, name: &str) -> Result<(), AppError>;
    async fn insert(&self, chunk: &Chunk, vector: &[f32]) -> Result<(), AppError>;
    async fn hybrid_search(
        &self,
        query: &str,
        vector: &[f32],
        alpha: f32,
        limit: usize,
        visibility: &Visibility,
    ) -> Result<Vec<VectorHit>, AppError>;
    async fn delete_by_doc(&self, doc_id: &str) -> Result<(), AppError>;
}

pub struct SurrealVectorStore {
    db: SurrealDbClient,
}

impl SurrealVectorStore {
    pub fn new(db: SurrealDbClient) -> Self {
        Self { db }
    }
}

#[derive(Debug, Deserialize)]
struct DenseRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    distance: f32,
}

#[derive(Debug, Deserialize)]
struct SparseRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    fts_score: f32,
}

fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f32::MAX, f32::min);
    let max = values.iter().cloned().fold(f32::MIN, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

#[async_trait]
impl VectorStore for SurrealVectorStore {
    async fn ensure_collection(&self, _name: &str) -> Result<(), AppError> {
        // Externally-supplied-vector mode: the collection is a logical
        // partition of the shared `chunk` table, not a physical resource,
        // so there is nothing to provision beyond the HNSW/BM25 indexes
        // `SurrealDbClient::build_indexes` already defines.
        Ok(())
    }

    async fn insert(&self, chunk: &Chunk, vector: &[f32]) -> Result<(), AppError> {
        self.db.store_item(chunk.clone()).await?;
        self.db
            .client
            .query("UPDATE type::thing('chunk', $id) MERGE { embedding: $embedding }")
            .bind(("id", chunk.id.clone()))
            .bind(("embedding", vector.to_vec()))
            .await?;
        Ok(())
    }

    async fn hybrid_search(
        &self,
        query: &str,
        vector: &[f32],
        alpha: f32,
        limit: usize,
        visibility: &Visibility,
    ) -> Result<Vec<VectorHit>, AppError> {
        let alpha = alpha.clamp(0.0, 1.0);
        let over_fetch = (limit * 4).max(20);

        let mut dense_scores: HashMap<String, f32> = HashMap::new();
        if alpha > 0.0 {
            let mut response = self
                .db
                .client
                .query(
                    "SELECT id, vector::distance::knn() AS distance FROM chunk \
                     WHERE scope_key.tenant_id = $tenant_id \
                       AND embedding <|$k,100|> $embedding \
                     ORDER BY distance ASC LIMIT $k",
                )
                .bind(("tenant_id", visibility.tenant_id.clone()))
                .bind(("embedding", vector.to_vec()))
                .bind(("k", over_fetch as i64))
                .await?;
            let rows: Vec<DenseRow> = response.take(0).unwrap_or_default();
            let similarities = min_max_normalize(
                &rows.iter().map(|r| 1.0 / (1.0 + r.distance.max(0.0))).collect::<Vec<_>>(),
            );
            for (row, sim) in rows.into_iter().zip(similarities) {
                dense_scores.insert(row.id, sim);
            }
        }

        let mut sparse_scores: HashMap<String, f32> = HashMap::new();
        if alpha < 1.0 {
            let mut response = self
                .db
                .client
                .query(
                    "SELECT id, search::score(0) AS fts_score FROM chunk \
                     WHERE scope_key.tenant_id = $tenant_id AND text @0@ $terms \
                     ORDER BY fts_score DESC LIMIT $k",
                )
                .bind(("tenant_id", visibility.tenant_id.clone()))
                .bind(("terms", query.to_string()))
                .bind(("k", over_fetch as i64))
                .await?;
            let rows: Vec<SparseRow> = response.take(0).unwrap_or_default();
            let normalized =
                min_max_normalize(&rows.iter().map(|r| r.fts_score).collect::<Vec<_>>());
            for (row, score) in rows.into_iter().zip(normalized) {
                sparse_scores.insert(row.id, score);
            }
        }

        let mut candidate_ids: Vec<String> = dense_scores.keys().cloned().collect();
        for id in sparse_scores.keys() {
            if !candidate_ids.contains(id) {
                candidate_ids.push(id.clone());
            }
        }

        let mut hits = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            let Some(chunk) = self.db.get_item::<Chunk>(&id).await? else {
                continue;
            };
            if !visibility.allows(&chunk.scope_key) {
                continue;
            }
            let dense = dense_scores.get(&id).copied().unwrap_or(0.0);
            let sparse = sparse_scores.get(&id).copied().unwrap_or(0.0);
            let score = alpha * dense + (1.0 - alpha) * sparse;
            hits.push(VectorHit { id, score, chunk });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_doc(&self, doc_id: &str) -> Result<(), AppError> {
        self.db
            .client
            .query("DELETE chunk WHERE doc_id = $doc_id")
            .bind(("doc_id", doc_id.to_string()))
            .await?;
        Ok(())
    }
}
