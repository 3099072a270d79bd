use common::error::AppError;

/// Fallback page size (bytes) used to synthesize pseudo-pages for content
/// types with no native pagination. Mirrors roughly a printed page of text.
const PSEUDO_PAGE_SIZE: usize = 4000;

/// A `[start_char, end_char)` byte range of `ExtractedDocument::text` that
/// belongs to one source page (or one synthesized pseudo-page).
#[derive(Debug, Clone, Copy)]
pub struct PageSpan {
    pub page: u32,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub pages: Vec<PageSpan>,
}

/// Extracts text and a page table from raw document bytes, dispatching on
/// the stored `content_type`. Only the three types spec'd for ingestion are
/// supported; anything else is a validation error rather than a silent
/// best-effort decode.
pub fn extract(content_type: &str, bytes: &[u8]) -> Result<ExtractedDocument, AppError> {
    match content_type {
        "application/pdf" => extract_pdf(bytes),
        "text/markdown" | "text/plain" => extract_plain(bytes),
        other => Err(AppError::Validation(format!(
            "unsupported content type for ingestion: {other}"
        ))),
    }
}

fn extract_plain(bytes: &[u8]) -> Result<ExtractedDocument, AppError> {
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|e| AppError::Validation(format!("document is not valid UTF-8: {e}")))?;
    let pages = synthesize_pseudo_pages(&text);
    Ok(ExtractedDocument { text, pages })
}

/// `pdf-extract`'s fast text-layer path. PDFs produced from a vision-only
/// scan (no embedded text layer) are out of scope here; callers see an
/// extraction failure for those rather than a silent empty document.
fn extract_pdf(bytes: &[u8]) -> Result<ExtractedDocument, AppError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map(|s| s.trim().to_string())
        .map_err(|e| AppError::Validation(format!("failed to extract PDF text: {e}")))?;
    if text.is_empty() {
        return Err(AppError::Validation(
            "PDF contains no extractable text layer".into(),
        ));
    }
    let pages = synthesize_pseudo_pages(&text);
    Ok(ExtractedDocument { text, pages })
}

fn synthesize_pseudo_pages(text: &str) -> Vec<PageSpan> {
    if text.is_empty() {
        return vec![PageSpan {
            page: 1,
            start_char: 0,
            end_char: 0,
        }];
    }

    let mut pages = Vec::new();
    let mut start = 0;
    let mut page_no = 1u32;
    while start < text.len() {
        let mut end = (start + PSEUDO_PAGE_SIZE).min(text.len());
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        pages.push(PageSpan {
            page: page_no,
            start_char: start,
            end_char: end,
        });
        start = end;
        page_no += 1;
    }
    pages
}

/// The set of page numbers whose span overlaps `[start, end)`.
pub fn pages_for_range(pages: &[PageSpan], start: usize, end: usize) -> Vec<u32> {
    pages
        .iter()
        .filter(|p| p.start_char < end && p.end_char > start)
        .map(|p| p.page)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_synthesizes_single_page_when_short() {
        let doc = extract("text/plain", b"hello world").unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].page, 1);
    }

    #[test]
    fn long_text_is_split_into_multiple_pseudo_pages() {
        let long_text = "a".repeat(PSEUDO_PAGE_SIZE * 3 + 10);
        let doc = extract("text/markdown", long_text.as_bytes()).unwrap();
        assert_eq!(doc.pages.len(), 4);
        assert_eq!(doc.pages.last().unwrap().end_char, long_text.len());
    }

    #[test]
    fn unsupported_content_type_is_rejected() {
        let err = extract("image/png", b"\x89PNG").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = extract("text/plain", &[0xff, 0xfe, 0xfd]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn pages_for_range_finds_overlapping_pages() {
        let pages = vec![
            PageSpan { page: 1, start_char: 0, end_char: 100 },
            PageSpan { page: 2, start_char: 100, end_char: 200 },
            PageSpan { page: 3, start_char: 200, end_char: 300 },
        ];
        assert_eq!(pages_for_range(&pages, 90, 150), vec![1, 2]);
        assert_eq!(pages_for_range(&pages, 250, 280), vec![3]);
    }
}
