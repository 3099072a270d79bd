use std::sync::OnceLock;

use common::error::AppError;
use serde::Deserialize;
use tokenizers::Tokenizer;

use crate::{
    extraction::{pages_for_range, PageSpan},
    llm::Completions,
    prompts::{chunker_schema, CHUNKER_SYSTEM_PROMPT},
};

/// Cached across the process: loading the tokenizer is the expensive part,
/// not building a window.
static TOKENIZER: OnceLock<Result<Tokenizer, String>> = OnceLock::new();

fn tokenizer() -> Result<&'static Tokenizer, AppError> {
    TOKENIZER
        .get_or_init(|| {
            Tokenizer::from_pretrained("bert-base-cased", None).map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| AppError::Internal(format!("failed to load chunker tokenizer: {e}")))
}

/// A chunk ready to be persisted, minus the `doc_id`/`scope_key` only the
/// caller (the ingestion worker) knows.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub start_char: usize,
    pub end_char: usize,
    pub pages: Vec<u32>,
    pub title: String,
    pub section: String,
    pub summary: String,
    pub why_this_chunk: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct ChunkerResponse {
    chunks: Vec<RawChunk>,
}

#[derive(Debug, Deserialize)]
struct RawChunk {
    text: String,
    title: String,
    section: String,
    summary: String,
    why_this_chunk: String,
    start_char: Option<usize>,
    end_char: Option<usize>,
}

struct Candidate {
    start: usize,
    end: usize,
    raw: RawChunk,
}

/// Runs the full sliding-window chunking algorithm over `text` and returns
/// the deduplicated, page-tagged chunk drafts.
pub async fn chunk_document(
    chat: &dyn Completions,
    text: &str,
    pages: &[PageSpan],
    window_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<ChunkDraft>, AppError> {
    let windows = slide_windows(text, window_tokens, overlap_tokens)?;
    if windows.is_empty() {
        return Err(AppError::Validation(
            "document has no content to chunk".into(),
        ));
    }

    let mut candidates = Vec::new();
    let mut any_window_succeeded = false;
    for (base_offset, window_text) in &windows {
        match call_window(chat, window_text).await {
            Ok(response) => {
                any_window_succeeded = true;
                for raw in response.chunks {
                    if let Some(candidate) = resolve_offsets(*base_offset, window_text, raw) {
                        candidates.push(candidate);
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    window_base = base_offset,
                    "chunking window failed, continuing with remaining windows"
                );
            }
        }
    }

    if !any_window_succeeded {
        return Err(AppError::MalformedUpstream(
            "every chunking window failed".into(),
        ));
    }

    let deduped = deduplicate(candidates);
    if deduped.is_empty() {
        return Err(AppError::MalformedUpstream(
            "chunker produced zero chunks".into(),
        ));
    }

    Ok(deduped
        .into_iter()
        .map(|c| ChunkDraft {
            pages: pages_for_range(pages, c.start, c.end),
            start_char: c.start,
            end_char: c.end,
            title: c.raw.title,
            section: c.raw.section,
            summary: c.raw.summary,
            why_this_chunk: c.raw.why_this_chunk,
            text: c.raw.text,
        })
        .collect())
}

/// Slides a `window_tokens`-wide, `overlap_tokens`-overlapping window over
/// `text`'s tokens and returns `(base_byte_offset, window_text)` pairs.
fn slide_windows(
    text: &str,
    window_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<(usize, String)>, AppError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let tok = tokenizer()?;
    let encoding = tok
        .encode(text, false)
        .map_err(|e| AppError::Internal(format!("tokenization failed: {e}")))?;
    let offsets = encoding.get_offsets();
    if offsets.is_empty() {
        return Ok(Vec::new());
    }

    let window_tokens = window_tokens.max(1);
    let stride = window_tokens.saturating_sub(overlap_tokens).max(1);

    let mut windows = Vec::new();
    let mut start_tok = 0;
    loop {
        let end_tok = (start_tok + window_tokens).min(offsets.len());
        let char_start = offsets[start_tok].0;
        let char_end = offsets[end_tok - 1].1;
        if char_end > char_start {
            windows.push((char_start, text[char_start..char_end].to_string()));
        }
        if end_tok >= offsets.len() {
            break;
        }
        start_tok += stride;
    }
    Ok(windows)
}

async fn call_window(chat: &dyn Completions, window_text: &str) -> Result<ChunkerResponse, AppError> {
    let value = chat
        .complete_json(
            CHUNKER_SYSTEM_PROMPT,
            window_text,
            "chunk_window",
            chunker_schema(),
        )
        .await?;
    serde_json::from_value(value)
        .map_err(|e| AppError::MalformedUpstream(format!("invalid chunker response: {e}")))
}

/// Resolves one raw LLM chunk to absolute document offsets, per the offset
/// mapping / substring-search fallback described by the chunking algorithm.
/// Returns `None` when neither offsets nor a locatable substring are
/// available, so the caller can simply drop that chunk.
fn resolve_offsets(base_offset: usize, window_text: &str, raw: RawChunk) -> Option<Candidate> {
    let (start, end) = match (raw.start_char, raw.end_char) {
        (Some(s), Some(e)) if e > s && e <= window_text.len() => {
            (base_offset + s, base_offset + e)
        }
        _ => {
            let idx = window_text.find(&raw.text)?;
            (base_offset + idx, base_offset + idx + raw.text.len())
        }
    };
    Some(Candidate { start, end, raw })
}

/// Drops later-discovered candidates that overlap an earlier-kept one by
/// more than 80% of the shorter span's length.
fn deduplicate(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by_key(|c| c.start);
    let mut kept: Vec<Candidate> = Vec::new();
    'candidates: for candidate in candidates {
        for existing in &kept {
            let overlap = candidate
                .end
                .min(existing.end)
                .saturating_sub(candidate.start.max(existing.start));
            let shorter = (candidate.end - candidate.start).min(existing.end - existing.start);
            if shorter > 0 && (overlap as f64 / shorter as f64) > 0.8 {
                continue 'candidates;
            }
        }
        kept.push(candidate);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubChat {
        responses: Vec<Value>,
        calls: AtomicUsize,
    }

    use serde_json::Value;

    #[async_trait]
    impl Completions for StubChat {
        async fn complete_json(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _schema_name: &str,
            _schema: Value,
        ) -> Result<Value, AppError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(idx)
                .cloned()
                .ok_or_else(|| AppError::Internal("stub exhausted".into()))
        }
    }

    fn one_page(len: usize) -> Vec<PageSpan> {
        vec![PageSpan { page: 1, start_char: 0, end_char: len }]
    }

    #[tokio::test]
    async fn single_window_chunk_with_explicit_offsets() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let stub = StubChat {
            responses: vec![serde_json::json!({
                "chunks": [{
                    "text": "The quick brown fox jumps over the lazy dog.",
                    "title": "Fox",
                    "section": "intro",
                    "summary": "A fox jumps over a dog.",
                    "why_this_chunk": "whole sentence",
                    "start_char": 0,
                    "end_char": text.len()
                }]
            })],
            calls: AtomicUsize::new(0),
        };

        let drafts = chunk_document(&stub, text, &one_page(text.len()), 512, 64)
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].start_char, 0);
        assert_eq!(drafts[0].end_char, text.len());
        assert_eq!(drafts[0].pages, vec![1]);
    }

    #[tokio::test]
    async fn missing_offsets_fall_back_to_substring_search() {
        let text = "Alpha section text. Beta section text.";
        let stub = StubChat {
            responses: vec![serde_json::json!({
                "chunks": [{
                    "text": "Beta section text.",
                    "title": "Beta",
                    "section": "beta",
                    "summary": "beta summary",
                    "why_this_chunk": "second sentence",
                    "start_char": null,
                    "end_char": null
                }]
            })],
            calls: AtomicUsize::new(0),
        };

        let drafts = chunk_document(&stub, text, &one_page(text.len()), 512, 64)
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(&text[drafts[0].start_char..drafts[0].end_char], "Beta section text.");
    }

    #[tokio::test]
    async fn malformed_response_fails_the_whole_document_when_only_window() {
        let stub = StubChat {
            responses: vec![serde_json::json!({"not_chunks": []})],
            calls: AtomicUsize::new(0),
        };
        let text = "some short document";
        let err = chunk_document(&stub, text, &one_page(text.len()), 512, 64)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedUpstream(_)));
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let stub = StubChat { responses: vec![], calls: AtomicUsize::new(0) };
        let err = chunk_document(&stub, "   ", &[], 512, 64).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn dedup_keeps_earlier_overlapping_candidate() {
        let candidates = vec![
            Candidate {
                start: 0,
                end: 100,
                raw: RawChunk {
                    text: "a".into(),
                    title: "a".into(),
                    section: "a".into(),
                    summary: "a".into(),
                    why_this_chunk: "a".into(),
                    start_char: None,
                    end_char: None,
                },
            },
            Candidate {
                start: 10,
                end: 95,
                raw: RawChunk {
                    text: "b".into(),
                    title: "b".into(),
                    section: "b".into(),
                    summary: "b".into(),
                    why_this_chunk: "b".into(),
                    start_char: None,
                    end_char: None,
                },
            },
        ];
        let kept = deduplicate(candidates);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].raw.title, "a");
    }
}
