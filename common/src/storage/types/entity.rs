use sha2::{Digest, Sha256};

use crate::stored_object;

stored_object!(Entity, "entity", {
    name: String,
    entity_type: String
});

/// Trim, collapse internal whitespace and case-fold a raw entity name before
/// it is hashed into an `entity_id`. Two chunks mentioning "Jane   Doe" and
/// "jane doe" resolve to the same entity node.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic id for an entity, stable across repeated extraction so that
/// `GraphStore::link_chunk_entities` can `MERGE` rather than duplicate.
pub fn entity_id(normalized_name: &str, entity_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(entity_type.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Entity {
    pub fn new(name: &str, entity_type: &str) -> Self {
        let normalized = normalize_name(name);
        let now = chrono::Utc::now();
        Self {
            id: entity_id(&normalized, entity_type),
            created_at: now,
            updated_at: now,
            name: normalized,
            entity_type: entity_type.to_string(),
        }
    }
}

/// A `(Chunk)-[MENTIONS]->(Entity)` edge, as written by the `neo4j` ingestion
/// stage via `GraphStore::link_chunk_entities`.
#[derive(Debug, Clone)]
pub struct Mention {
    pub chunk_id: String,
    pub entity_id: String,
}

/// A raw `{name, type}` pair as returned (and validated) from the entity
/// extractor's LLM call, before normalization.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_name("  Jane   Doe  "), "jane doe");
        assert_eq!(normalize_name("jane doe"), "jane doe");
    }

    #[test]
    fn entity_id_is_stable_across_equivalent_names() {
        let a = entity_id(&normalize_name("Jane   Doe"), "person");
        let b = entity_id(&normalize_name("jane doe"), "person");
        assert_eq!(a, b);
    }

    #[test]
    fn entity_id_differs_by_type() {
        let a = entity_id(&normalize_name("Paris"), "location");
        let b = entity_id(&normalize_name("Paris"), "person");
        assert_ne!(a, b);
    }
}
