//! PDF text extraction using lopdf and pdf-extract.

use std::path::Path;

use lopdf::Document;
use tracing::{debug, trace, warn};

use super::join_pages;
use crate::error::DocumentError;

/// Page-ordered text extraction from PDF bytes.
///
/// Text is extracted page by page with lopdf. When lopdf yields no text at
/// all, the whole document goes through pdf-extract instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextReader;

impl PdfTextReader {
    pub fn new() -> Self {
        Self
    }

    /// Extract the text of a PDF file.
    pub fn read_file(&self, path: &Path) -> Result<String, DocumentError> {
        let data = std::fs::read(path)?;
        self.read_bytes(&data)
    }

    /// Extract the text of an in-memory PDF.
    pub fn read_bytes(&self, data: &[u8]) -> Result<String, DocumentError> {
        let mut doc = Document::load_mem(data).map_err(|e| DocumentError::Parse(e.to_string()))?;

        // Statements are often "encrypted" with an empty user password
        let raw_data = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(DocumentError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| DocumentError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(DocumentError::NoPages);
        }
        debug!("Loaded PDF with {} pages", pages.len());

        let mut texts = Vec::with_capacity(pages.len());
        for &number in pages.keys() {
            match doc.extract_text(&[number]) {
                Ok(text) => {
                    trace!("Page {}: {} chars", number, text.len());
                    texts.push(text);
                }
                Err(e) => {
                    warn!("lopdf could not extract page {}: {}", number, e);
                    texts.push(String::new());
                }
            }
        }

        if texts.iter().any(|t| !t.trim().is_empty()) {
            return Ok(join_pages(&texts));
        }

        debug!("No text from lopdf, falling back to pdf-extract");
        let text = pdf_extract::extract_text_from_mem(&raw_data)
            .map_err(|e| DocumentError::TextExtraction(e.to_string()))?;
        // pdf-extract separates pages with form feeds
        let pages: Vec<&str> = text.split('\u{c}').filter(|p| !p.trim().is_empty()).collect();
        if pages.is_empty() {
            return Err(DocumentError::TextExtraction(
                "document contains no extractable text".to_string(),
            ));
        }
        Ok(join_pages(&pages))
    }
}
