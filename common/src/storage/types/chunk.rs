use crate::{scope::ScopeKey, stored_object};

stored_object!(Chunk, "chunk", {
    doc_id: String,
    scope_key: ScopeKey,
    start_char: usize,
    end_char: usize,
    pages: Vec<u32>,
    title: String,
    section: String,
    summary: String,
    why_this_chunk: String,
    text: String
});

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        doc_id: String,
        scope_key: ScopeKey,
        start_char: usize,
        end_char: usize,
        pages: Vec<u32>,
        title: String,
        section: String,
        summary: String,
        why_this_chunk: String,
        text: String,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            doc_id,
            scope_key,
            start_char,
            end_char,
            pages,
            title,
            section,
            summary,
            why_this_chunk,
            text,
        }
    }
}

/// A chunk paired with the dense vector that represents it, as handed to
/// `VectorStore::insert`.
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}
