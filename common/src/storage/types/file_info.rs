use sha2::{Digest, Sha256};
use std::io::Read;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("file name missing in upload metadata")]
    MissingFileName,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sanitizes a user-supplied file name for use as the final path component
/// under `<DATA_DIR>/uploads/<tenant_id>/<doc_id>/`. Normalizes backslashes
/// to forward slashes, drops any directory components (path traversal), and
/// keeps only the basename.
pub fn sanitize_file_name(file_name: &str) -> String {
    let normalized = file_name.replace('\\', "/");
    let basename = normalized
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("upload");

    if let Some(idx) = basename.rfind('.') {
        let (name, ext) = basename.split_at(idx);
        let sanitized_name = sanitize_component(name);
        format!("{sanitized_name}{ext}")
    } else {
        sanitize_component(basename)
    }
}

fn sanitize_component(component: &str) -> String {
    let sanitized: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}

/// Logical upload location relative to the storage root, matching the
/// filesystem layout `<DATA_DIR>/uploads/<tenant_id>/<doc_id>/<basename>`.
pub fn upload_location(tenant_id: &str, doc_id: &str, sanitized_file_name: &str) -> String {
    format!("uploads/{tenant_id}/{doc_id}/{sanitized_file_name}")
}

/// Streaming SHA256 of a readable source, used only for content-addressed
/// future dedup (see open questions); not currently consulted on ingest.
pub fn sha256_of(mut reader: impl Read) -> Result<String, FileError> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_safe_names_unchanged() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
    }

    #[test]
    fn sanitize_strips_path_traversal() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("a/b/../c.txt"), "c.txt");
    }

    #[test]
    fn sanitize_normalizes_backslashes() {
        assert_eq!(sanitize_file_name("C:\\docs\\readme.md"), "readme.md");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_file_name("my report (final).txt"), "my_report__final_.txt");
    }

    #[test]
    fn upload_location_is_scoped_by_tenant_and_doc() {
        assert_eq!(
            upload_location("t1", "d1", "file.txt"),
            "uploads/t1/d1/file.txt"
        );
    }
}
