//! Remote OCR fallback for scanned PDFs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::OcrConfig;
use crate::error::ScrapeError;
use crate::utils::HttpClient;

/// Turns a publicly reachable PDF into text
#[async_trait]
pub trait OcrService: Send + Sync {
    async fn recognize(&self, pdf_url: &str) -> Result<String, ScrapeError>;
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrDocument<'a>,
    include_image_base64: bool,
}

#[derive(Debug, Serialize)]
struct OcrDocument<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    document_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Vec<OcrPage>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl OcrResponse {
    /// Page texts (markdown preferred) joined by blank lines
    fn into_text(self) -> String {
        self.pages
            .into_iter()
            .filter_map(|page| {
                page.markdown
                    .filter(|m| !m.is_empty())
                    .or(page.text.filter(|t| !t.is_empty()))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Mistral document OCR client
#[derive(Debug, Clone)]
pub struct MistralOcr {
    http: HttpClient,
    api_key: String,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl MistralOcr {
    /// `None` when no API key is configured
    pub fn from_config(http: HttpClient, config: &OcrConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty())?;
        Some(Self {
            http,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl OcrService for MistralOcr {
    async fn recognize(&self, pdf_url: &str) -> Result<String, ScrapeError> {
        tracing::info!("OCR processing: {}", pdf_url);

        let request = OcrRequest {
            model: &self.model,
            document: OcrDocument {
                kind: "document_url",
                document_url: pdf_url,
            },
            include_image_base64: false,
        };

        let response = self
            .http
            .client()
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScrapeError::OcrUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::OcrUnavailable(format!(
                "OCR service returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: OcrResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::OcrUnavailable(format!("OCR response: {}", e)))?;

        let text = body.into_text();
        tracing::info!("OCR extracted {} characters", text.chars().count());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::Server) -> MistralOcr {
        let config = OcrConfig {
            api_key: Some("ocr-key".to_string()),
            endpoint: format!("{}/v1/ocr", server.url()),
            ..Default::default()
        };
        MistralOcr::from_config(HttpClient::new().unwrap(), &config).unwrap()
    }

    #[test]
    fn test_disabled_without_key() {
        let config = OcrConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(MistralOcr::from_config(HttpClient::new().unwrap(), &config).is_none());
    }

    #[tokio::test]
    async fn test_recognize_joins_pages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/ocr")
            .match_header("authorization", "Bearer ocr-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "mistral-ocr-latest",
                "document": { "type": "document_url", "document_url": "https://x/a.pdf" }
            })))
            .with_body(r##"{"pages":[{"index":0,"markdown":"# Baslik"},{"index":1,"markdown":"","text":"ikinci"}]}"##)
            .create_async()
            .await;

        let text = client(&server).recognize("https://x/a.pdf").await.unwrap();
        assert_eq!(text, "# Baslik\n\nikinci");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/ocr")
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server).recognize("https://x/a.pdf").await.unwrap_err();
        assert!(matches!(err, ScrapeError::OcrUnavailable(_)));
    }
}
