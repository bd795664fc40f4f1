//! Self-contained HTML viewer for extracted PDF text.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::models::PdfDocument;

const STYLE: &str = "body{font-family:sans-serif;line-height:1.6;padding:20px;max-width:900px;margin:auto;background-color:#f8f9fa;}\
pre{background:#fff;padding:15px;border-radius:5px;overflow-x:auto;white-space:pre-wrap;word-wrap:break-word;border:1px solid #dee2e6;}\
a button{padding:10px 15px;cursor:pointer;}\
h1{text-align:center;}";

/// Render the document as a single HTML page with a link back to the PDF
pub fn render_viewer(document: &PdfDocument) -> String {
    format!(
        concat!(
            "<!DOCTYPE html><html lang=\"tr\"><head><meta charset=\"UTF-8\">",
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">",
            "<title>PDF İçeriği - {title}</title><style>{style}</style></head><body>",
            "<h1>Metne Dönüştürülmüş PDF İçeriği</h1>",
            "<p style=\"text-align:center;\"><a href=\"{href}\" target=\"_blank\" rel=\"noopener\">",
            "<button>Orijinal PDF'yi Görüntüle</button></a></p>",
            "<pre>{text}</pre></body></html>"
        ),
        title = encode_text(document.file_name()),
        style = STYLE,
        href = encode_double_quoted_attribute(&document.source_url),
        text = encode_text(&document.extracted_text),
    )
}
