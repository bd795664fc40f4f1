//! Local text-layer extraction.

use std::path::Path;

use crate::error::ScrapeError;

/// Extracts the text layer of a PDF on disk.
///
/// Implementations are synchronous and CPU-bound; callers run them on the
/// blocking pool.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ScrapeError>;
}

/// Extractor backed by the `pdf-extract` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractText;

impl TextExtractor for PdfExtractText {
    fn extract(&self, path: &Path) -> Result<String, ScrapeError> {
        if !path.is_file() {
            return Err(ScrapeError::ExtractionFailed(format!(
                "not a file: {}",
                path.display()
            )));
        }

        match pdf_extract::extract_text(path) {
            Ok(text) => {
                if text.trim().is_empty() {
                    tracing::debug!("No text layer in {}", path.display());
                }
                Ok(text)
            }
            Err(e) => Err(ScrapeError::ExtractionFailed(format!(
                "pdf text extraction: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file() {
        let result = PdfExtractText.extract(Path::new("/nonexistent/file.pdf"));
        assert!(matches!(result, Err(ScrapeError::ExtractionFailed(_))));
    }

    #[test]
    fn test_garbage_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not a pdf").unwrap();
        assert!(PdfExtractText.extract(file.path()).is_err());
    }
}
