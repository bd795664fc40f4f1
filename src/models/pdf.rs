//! Converted PDF document model.

use serde::{Deserialize, Serialize};

/// Which stage produced the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Local text-layer extraction
    Primary,
    /// Remote OCR
    Ocr,
    /// Nothing usable; text is the placeholder
    Unavailable,
}

/// Text extracted from a PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfDocument {
    pub source_url: String,
    pub extracted_text: String,
    pub extraction_method: ExtractionMethod,
}

impl PdfDocument {
    /// File name component of the source URL, used as the viewer title
    pub fn file_name(&self) -> &str {
        let path = self
            .source_url
            .split(['?', '#'])
            .next()
            .unwrap_or(&self.source_url);
        path.rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("document")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        let doc = PdfDocument {
            source_url: "https://dergipark.org.tr/tr/download/article-file/123456?x=1".to_string(),
            extracted_text: String::new(),
            extraction_method: ExtractionMethod::Primary,
        };
        assert_eq!(doc.file_name(), "123456");
    }
}
