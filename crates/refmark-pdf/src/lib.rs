use std::path::Path;
use thiserror::Error;

pub mod authoryear;
pub mod reflist;

pub use authoryear::{BROKEN_REFERENCE_KEY, derive_author_year_key};
pub use reflist::{RefEntry, ReferenceList, extract_reference_list};

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("PDF path is not valid UTF-8")]
    InvalidPath,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract the full plain text of a PDF in linear reading order,
/// newline-delimited. No layout fidelity beyond that.
#[cfg(feature = "pdf")]
pub fn extract_text(pdf_path: &Path) -> Result<String, PdfError> {
    let path = pdf_path.to_str().ok_or(PdfError::InvalidPath)?;
    let doc = mupdf::Document::open(path).map_err(|e| PdfError::OpenError(e.to_string()))?;
    let mut text = String::new();
    let pages = doc
        .pages()
        .map_err(|e| PdfError::ExtractionError(e.to_string()))?;
    for page in pages {
        let page = page.map_err(|e| PdfError::ExtractionError(e.to_string()))?;
        let page_text = page
            .to_text()
            .map_err(|e| PdfError::ExtractionError(e.to_string()))?;
        text.push_str(&page_text);
        if !text.ends_with('\n') {
            text.push('\n');
        }
    }
    Ok(text)
}
