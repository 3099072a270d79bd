use std::collections::HashMap;

use common::{
    error::AppError,
    llm::Embedder,
    scope::{ScopeKey, Visibility},
    storage::{graph_store::GraphStore, vector_store::VectorStore},
};
use serde::Serialize;

use crate::reranker::Reranker;

/// Request accepted by `retrieve`; field ranges are enforced by the caller
/// (the HTTP layer clamps/validates before constructing this).
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub query: String,
    pub limit: usize,
    pub alpha: f32,
}

/// One scored, merged retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub source: ChunkSource,
    pub chunk_id: String,
    pub doc_id: String,
    pub scope_key: ScopeKey,
    pub title: String,
    pub section: String,
    pub summary: String,
    pub pages: Vec<u32>,
    pub text: String,
    pub score: f32,
    pub rerank_score: f32,
    pub also_from_graph: bool,
    pub graph_shared_entities: Option<usize>,
    pub graph_entities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSource {
    Weaviate,
    Graph,
}

/// Diagnostic block describing whether/how graph expansion ran.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphDiagnostics {
    pub enabled: bool,
    pub seed_chunk_ids: Vec<String>,
    pub expanded_count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResult {
    pub results: Vec<RetrievedChunk>,
    pub graph: GraphDiagnostics,
}

/// Runs the full hybrid-search → rerank → graph-expand → rerank pipeline
/// described for `POST /v1/retrieve`.
pub async fn retrieve(
    request: &RetrieveRequest,
    visibility: &Visibility,
    embedder: &dyn Embedder,
    vectors: &dyn VectorStore,
    graph: &dyn GraphStore,
    reranker: &dyn Reranker,
    graph_enabled: bool,
) -> Result<RetrieveResult, AppError> {
    let query_vector = embedder.embed_one(&request.query).await?;

    let over_fetch = (request.limit * 4).max(20);
    let hits = vectors
        .hybrid_search(&request.query, &query_vector, request.alpha, over_fetch, visibility)
        .await?;

    let mut merged: Vec<RetrievedChunk> = hits
        .into_iter()
        .map(|hit| RetrievedChunk {
            source: ChunkSource::Weaviate,
            chunk_id: hit.chunk.id.clone(),
            doc_id: hit.chunk.doc_id.clone(),
            scope_key: hit.chunk.scope_key.clone(),
            title: hit.chunk.title.clone(),
            section: hit.chunk.section.clone(),
            summary: hit.chunk.summary.clone(),
            pages: hit.chunk.pages.clone(),
            text: hit.chunk.text.clone(),
            score: hit.score,
            rerank_score: hit.score,
            also_from_graph: false,
            graph_shared_entities: None,
            graph_entities: None,
        })
        .collect();

    rerank_in_place(&request.query, &mut merged, reranker).await;
    sort_by_rerank_score(&mut merged);

    let mut graph_diagnostics = GraphDiagnostics {
        enabled: graph_enabled,
        ..Default::default()
    };

    if graph_enabled {
        let seed_count = merged.len().min(10);
        let seed_chunk_ids: Vec<String> =
            merged.iter().take(seed_count).map(|c| c.chunk_id.clone()).collect();
        graph_diagnostics.seed_chunk_ids = seed_chunk_ids.clone();

        let k_exp = (request.limit * 2).max(10);
        match graph
            .expand_by_shared_entities(&seed_chunk_ids, visibility, k_exp)
            .await
        {
            Ok(expanded) => {
                graph_diagnostics.expanded_count = expanded.len();
                merge_graph_expansion(&mut merged, expanded, &seed_chunk_ids);
            }
            Err(err) => {
                graph_diagnostics.error = Some(err.to_string());
            }
        }
    }

    rerank_in_place(&request.query, &mut merged, reranker).await;
    sort_by_rerank_score(&mut merged);
    merged.truncate(request.limit);

    Ok(RetrieveResult { results: merged, graph: graph_diagnostics })
}

async fn rerank_in_place(query: &str, chunks: &mut [RetrievedChunk], reranker: &dyn Reranker) {
    if chunks.is_empty() {
        return;
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    match reranker.score(query, &texts).await {
        Ok(scores) => {
            for (chunk, score) in chunks.iter_mut().zip(scores) {
                chunk.rerank_score = score;
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "reranker call failed, keeping prior ordering");
        }
    }
}

fn sort_by_rerank_score(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}


fn merge_graph_expansion(
    merged: &mut Vec<RetrievedChunk>,
    expanded: Vec<common::storage::graph_store::ExpandedChunk>,
    seed_chunk_ids: &[String],
) {
    let mut by_id: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.chunk_id.clone(), idx))
        .collect();

    for exp in expanded {
        let chunk_id = exp.chunk.id.clone();
        if seed_chunk_ids.contains(&chunk_id) {
            continue;
        }
        if let Some(&idx) = by_id.get(&chunk_id) {
            merged[idx].also_from_graph = true;
            merged[idx].graph_shared_entities = Some(exp.shared_entity_count);
            merged[idx].graph_entities = Some(exp.entity_names);
        } else {
            by_id.insert(chunk_id.clone(), merged.len());
            merged.push(RetrievedChunk {
                source: ChunkSource::Graph,
                chunk_id,
                doc_id: exp.chunk.doc_id.clone(),
                scope_key: exp.chunk.scope_key.clone(),
                title: exp.chunk.title.clone(),
                section: exp.chunk.section.clone(),
                summary: exp.chunk.summary.clone(),
                pages: exp.chunk.pages.clone(),
                text: exp.chunk.text.clone(),
                score: 0.0,
                rerank_score: 0.0,
                also_from_graph: true,
                graph_shared_entities: Some(exp.shared_entity_count),
                graph_entities: Some(exp.entity_names),
            });
        }
    }
}
