use pdfium_render::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::error::AnalysisError;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("PDFium library unavailable: {0}")]
    LibraryUnavailable(String),

    #[error("PDF is password protected")]
    Encrypted,

    #[error("failed to load PDF: {0}")]
    InvalidDocument(String),
}

impl From<ExtractionError> for AnalysisError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::LibraryUnavailable(reason) => AnalysisError::Internal(reason),
            other => AnalysisError::UnreadableDocument(other.to_string()),
        }
    }
}

/// Pulls the embedded text layer out of a page-description document.
///
/// Implementations are synchronous; callers run them on the blocking pool.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Text-layer extraction through Google PDFium.
///
/// The library handle is loaded per call since `Pdfium` is not `Send`.
pub struct PdfiumTextExtractor;

impl TextExtractor for PdfiumTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(map_load_error)?;

        let pages: Vec<String> = document
            .pages()
            .iter()
            .map(|page| page.text().map(|t| t.all()).unwrap_or_default())
            .collect();

        debug!(pages = pages.len(), "Extracted PDF text layer");
        Ok(pages.join("\n"))
    }
}

/// `PDFIUM_DYNAMIC_LIB_PATH` first, then the system library search path.
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
            .or_else(|_| Pdfium::bind_to_library(&path))
            .map_err(|e| ExtractionError::LibraryUnavailable(format!("{path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::LibraryUnavailable(format!(
            "set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::Encrypted
    } else {
        ExtractionError::InvalidDocument(msg)
    }
}
