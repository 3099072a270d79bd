use common::{error::AppError, storage::types::entity::ExtractedEntity};
use serde::Deserialize;

use crate::{
    llm::Completions,
    prompts::{entity_schema, ENTITY_SYSTEM_PROMPT},
};

#[derive(Debug, Deserialize)]
struct EntityResponse {
    entities: Vec<RawEntity>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
}

/// Extracts entities from a single chunk's text. A malformed LLM response
/// fails this chunk; an empty `entities` array is a valid result.
pub async fn extract_entities(
    chat: &dyn Completions,
    chunk_text: &str,
) -> Result<Vec<ExtractedEntity>, AppError> {
    let value = chat
        .complete_json(
            ENTITY_SYSTEM_PROMPT,
            chunk_text,
            "entity_extraction",
            entity_schema(),
        )
        .await?;
    let response: EntityResponse = serde_json::from_value(value).map_err(|e| {
        AppError::MalformedUpstream(format!("invalid entity extraction response: {e}"))
    })?;

    Ok(response
        .entities
        .into_iter()
        .filter(|e| !e.name.trim().is_empty() && !e.entity_type.trim().is_empty())
        .map(|e| ExtractedEntity {
            name: e.name,
            entity_type: e.entity_type,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubChat(Value);

    #[async_trait]
    impl Completions for StubChat {
        async fn complete_json(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _schema_name: &str,
            _schema: Value,
        ) -> Result<Value, AppError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn extracts_well_formed_entities() {
        let stub = StubChat(serde_json::json!({
            "entities": [
                {"name": "Ada Lovelace", "type": "person"},
                {"name": "London", "type": "location"}
            ]
        }));
        let entities = extract_entities(&stub, "Ada Lovelace lived in London").await.unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn filters_out_blank_entities() {
        let stub = StubChat(serde_json::json!({
            "entities": [
                {"name": "  ", "type": "person"},
                {"name": "Babbage", "type": ""},
                {"name": "Turing", "type": "person"}
            ]
        }));
        let entities = extract_entities(&stub, "text").await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Turing");
    }

    #[tokio::test]
    async fn empty_entity_list_is_valid() {
        let stub = StubChat(serde_json::json!({"entities": []}));
        let entities = extract_entities(&stub, "no proper nouns here").await.unwrap();
        assert!(entities.is_empty());
    }

    #[tokio::test]
    async fn malformed_response_fails() {
        let stub = StubChat(serde_json::json!({"wrong_key": []}));
        let err = extract_entities(&stub, "text").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedUpstream(_)));
    }
}
