use std::path::Path;

use lopdf::Document;
use tracing::debug;

use super::ParseError;

/// Extract text page by page and join the pages with newlines.
pub fn extract_text(path: &Path) -> Result<String, ParseError> {
    let doc = Document::load(path).map_err(|e| ParseError::Pdf(e.to_string()))?;

    let pages = doc.get_pages();
    debug!("PDF has {} pages", pages.len());

    let mut texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        let text = doc
            .extract_text(&[*page_number])
            .map_err(|e| ParseError::Pdf(format!("page {page_number}: {e}")))?;
        texts.push(text);
    }
    Ok(texts.join("\n"))
}
