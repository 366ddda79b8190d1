//! Document sources.
//!
//! A source turns a document identifier into page-ordered plain text. Pages
//! after the first are preceded by a `--- PAGE n ---` marker line so the
//! transaction parser can skip page breaks.

#[cfg(feature = "pdf")]
mod pdf;

#[cfg(feature = "pdf")]
pub use pdf::PdfTextReader;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::DocumentError;

/// Trait for document text sources.
pub trait DocumentSource: Send + Sync {
    /// Page-ordered text of the document named `id`.
    fn read_text(&self, id: &str) -> Result<String, DocumentError>;
}

/// Marker line placed before page `n`.
pub fn page_marker(n: usize) -> String {
    format!("--- PAGE {} ---", n)
}

/// Join page texts with page markers.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut text = String::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            text.push_str("\n\n");
            text.push_str(&page_marker(i + 1));
            text.push_str("\n\n");
        }
        text.push_str(page.as_ref().trim_end());
    }
    text
}

/// Reads documents from the file system.
///
/// `.pdf` files go through [`PdfTextReader`] (with the `pdf` feature),
/// `.txt` files are read as already-extracted text.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative identifiers against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, id: &str) -> PathBuf {
        match &self.root {
            Some(root) if Path::new(id).is_relative() => root.join(id),
            _ => PathBuf::from(id),
        }
    }
}

impl DocumentSource for FileSource {
    fn read_text(&self, id: &str) -> Result<String, DocumentError> {
        let path = self.resolve(id);
        if !path.is_file() {
            return Err(DocumentError::NotFound(path.display().to_string()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        debug!("Reading {} ({})", path.display(), extension);

        match extension.as_str() {
            "txt" | "text" => Ok(std::fs::read_to_string(&path)?),
            #[cfg(feature = "pdf")]
            "pdf" => PdfTextReader::new().read_file(&path),
            other => Err(DocumentError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// In-memory documents, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: HashMap<String, Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-page document.
    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(id.into(), vec![text.into()]);
    }

    /// Add a document page by page.
    pub fn insert_pages(&mut self, id: impl Into<String>, pages: Vec<String>) {
        self.documents.insert(id.into(), pages);
    }

    pub fn with_document(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(id, text);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentSource for MemorySource {
    fn read_text(&self, id: &str) -> Result<String, DocumentError> {
        let pages = self
            .documents
            .get(id)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
        if pages.is_empty() {
            return Err(DocumentError::NoPages);
        }
        Ok(join_pages(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_join_pages() {
        let text = join_pages(&["first\n", "second"]);
        assert_eq!(text, "first\n\n--- PAGE 2 ---\n\nsecond");
        assert_eq!(join_pages(&["only"]), "only");
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemorySource::new().with_document("a", "Closing Balance 1.00");
        source.insert_pages("b", vec!["p1".to_string(), "p2".to_string()]);
        source.insert_pages("empty", Vec::new());

        assert_eq!(source.read_text("a").unwrap(), "Closing Balance 1.00");
        assert!(source.read_text("b").unwrap().contains("--- PAGE 2 ---"));
        assert!(matches!(source.read_text("missing"), Err(DocumentError::NotFound(_))));
        assert!(matches!(source.read_text("empty"), Err(DocumentError::NoPages)));
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_file_source_reads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("stmt.txt")).unwrap();
        writeln!(file, "Ending Balance 5.00").unwrap();

        let source = FileSource::with_root(dir.path());
        assert_eq!(source.read_text("stmt.txt").unwrap().trim(), "Ending Balance 5.00");
        assert!(matches!(source.read_text("nope.txt"), Err(DocumentError::NotFound(_))));
    }

    #[test]
    fn test_file_source_rejects_unknown_formats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stmt.docx"), b"binary").unwrap();

        let source = FileSource::with_root(dir.path());
        assert!(matches!(
            source.read_text("stmt.docx"),
            Err(DocumentError::UnsupportedFormat(ext)) if ext == "docx"
        ));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn test_file_source_reports_broken_pdf() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf").unwrap();

        let source = FileSource::with_root(dir.path());
        assert!(matches!(source.read_text("broken.pdf"), Err(DocumentError::Parse(_))));
    }
}
