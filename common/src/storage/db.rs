use super::types::StoredObject;
use futures::Stream;
use std::{ops::Deref, sync::Arc};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};

/// Thin wrapper around a connected `Surreal<Any>` handle.
///
/// Backs `MetaStore`, `VectorStore` and `GraphStore` for the default
/// single-database deployment: all three concerns live in one SurrealDB
/// instance, distinguished by table name.
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

/// Vector dimensionality of the configured embedding model. Used to size the HNSW index.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;
        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }

    /// Defines the indexes backing vector search and job dequeue.
    ///
    /// Idempotent: `DEFINE INDEX` in SurrealDB overwrites an existing
    /// definition with the same name.
    pub async fn build_indexes(&self) -> Result<(), Error> {
        self.client
            .query(format!(
                "DEFINE INDEX idx_chunk_embedding ON chunk FIELDS embedding HNSW DIMENSION {EMBEDDING_DIMENSIONS}"
            ))
            .await?;
        self.client
            .query("DEFINE ANALYZER rag_text TOKENIZERS blank,class FILTERS lowercase,snowball(english)")
            .await?;
        self.client
            .query("DEFINE INDEX idx_chunk_fts ON chunk FIELDS text SEARCH ANALYZER rag_text BM25")
            .await?;
        self.client
            .query("DEFINE INDEX idx_document_status ON document FIELDS status")
            .await?;
        self.client
            .query("DEFINE INDEX idx_document_scope ON document FIELDS scope_key.tenant_id, scope_key.scope, scope_key.workspace_id")
            .await?;
        self.client
            .query("DEFINE INDEX idx_job_created ON job FIELDS created_at")
            .await?;
        self.client
            .query("DEFINE INDEX idx_entity_name ON entity FIELDS name")
            .await?;
        Ok(())
    }

    pub async fn rebuild_indexes(&self) -> Result<(), Error> {
        self.client
            .query("REBUILD INDEX IF EXISTS idx_chunk_embedding ON chunk")
            .await?;
        self.client
            .query("REBUILD INDEX IF EXISTS idx_chunk_fts ON chunk")
            .await?;
        Ok(())
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("store");
        assert!(stored.is_some());

        let fetched = db.get_item::<Dummy>(&dummy.id).await.expect("fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        let all = db.get_all_stored_items::<Dummy>().await.expect("fetch all");
        assert!(all.contains(&dummy));

        let deleted = db.delete_item::<Dummy>(&dummy.id).await.expect("delete");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db.get_item::<Dummy>("abc").await.expect("fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_build_indexes() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.build_indexes().await.expect("build indexes");
    }
}
