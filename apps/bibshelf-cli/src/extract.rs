//! PDF page text extraction with pdfium-render.

use bibshelf_core::{Error, Result, TextExtractor};
use pdfium_render::prelude::*;
use std::path::Path;

/// Extracts one text string per page through the pdfium library.
pub struct PdfiumExtractor {
    pdfium: Pdfium,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self {
            pdfium: Pdfium::default(),
        }
    }
}

impl TextExtractor for PdfiumExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(&bytes, None)
            .map_err(|e| Error::Parse(format!("failed to load {}: {}", path.display(), e)))?;

        let mut pages = Vec::with_capacity(document.pages().len() as usize);
        for page in document.pages().iter() {
            let text = page
                .text()
                .map_err(|e| Error::Parse(format!("text extraction failed: {}", e)))?;
            pages.push(text.all());
        }
        Ok(pages)
    }
}
