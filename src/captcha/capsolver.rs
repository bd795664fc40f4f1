//! Client for the CapSolver task API (`createTask` / `getTaskResult`).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CaptchaConfig;
use crate::error::ScrapeError;
use crate::models::{CaptchaTask, ChallengeKind, TaskStatus};
use crate::utils::HttpClient;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    client_key: &'a str,
    task: TaskSpec<'a>,
}

#[derive(Debug, Serialize)]
struct TaskSpec<'a> {
    #[serde(rename = "type")]
    task_type: &'a str,
    #[serde(rename = "websiteURL")]
    website_url: &'a str,
    #[serde(rename = "websiteKey")]
    website_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultRequest<'a> {
    client_key: &'a str,
    task_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceResponse {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<Solution>,
}

impl ServiceResponse {
    fn error_message(&self) -> String {
        format!(
            "errorId={} {} {}",
            self.error_id,
            self.error_code.as_deref().unwrap_or(""),
            self.error_description.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Solution {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    g_recaptcha_response: Option<String>,
}

impl Solution {
    fn into_token(self) -> Option<String> {
        self.token
            .or(self.g_recaptcha_response)
            .filter(|t| !t.is_empty())
    }
}

/// CapSolver API client
#[derive(Debug, Clone)]
pub struct CapSolverClient {
    http: HttpClient,
    api_key: String,
    create_task_url: String,
    get_result_url: String,
    poll_interval: Duration,
    timeout: Duration,
    max_poll_failures: u32,
    request_timeout: Duration,
}

impl CapSolverClient {
    /// Build a client; `None` when no API key is configured
    pub fn from_config(http: HttpClient, config: &CaptchaConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http,
            api_key,
            create_task_url: config.create_task_url.clone(),
            get_result_url: config.get_result_url.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            max_poll_failures: config.max_poll_failures,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Override polling cadence and budget
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.timeout = timeout;
        self
    }

    async fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<ServiceResponse, ScrapeError> {
        let response = self
            .http
            .client()
            .post(url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Network(format!(
                "solving service returned HTTP {}",
                status.as_u16()
            )));
        }

        response
            .json::<ServiceResponse>()
            .await
            .map_err(|e| ScrapeError::Parse(format!("solving service response: {}", e)))
    }

    /// Submit a solving task
    pub async fn create_task(
        &self,
        kind: ChallengeKind,
        website_url: &str,
        site_key: &str,
    ) -> Result<CaptchaTask, ScrapeError> {
        let request = CreateTaskRequest {
            client_key: &self.api_key,
            task: TaskSpec {
                task_type: kind.task_type(),
                website_url,
                website_key: site_key,
            },
        };

        let response = self.post(&self.create_task_url, &request).await?;
        if response.error_id != 0 {
            return Err(ScrapeError::CaptchaUnsolved(format!(
                "createTask rejected: {}",
                response.error_message()
            )));
        }

        let task_id = response
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ScrapeError::CaptchaUnsolved("createTask returned no taskId".to_string()))?;

        tracing::info!("Solving task created: {} ({})", task_id, kind.task_type());
        Ok(CaptchaTask::new(task_id))
    }

    /// Poll until the task is terminal, the budget runs out or transport keeps failing
    pub async fn wait_for_token(&self, task: &mut CaptchaTask) -> Result<String, ScrapeError> {
        let deadline = Instant::now() + self.timeout;
        let mut failures = 0u32;

        while Instant::now() < deadline {
            tokio::time::sleep(self.poll_interval).await;

            let request = TaskResultRequest {
                client_key: &self.api_key,
                task_id: &task.id,
            };

            let response = match self.post(&self.get_result_url, &request).await {
                Ok(response) => response,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        "Solving service poll failed ({}/{}): {}",
                        failures,
                        self.max_poll_failures,
                        e
                    );
                    if failures >= self.max_poll_failures {
                        task.status = TaskStatus::Failed;
                        return Err(ScrapeError::CaptchaUnsolved(format!(
                            "polling aborted after {} transport errors",
                            failures
                        )));
                    }
                    continue;
                }
            };

            let status = if response.error_id != 0 {
                TaskStatus::Failed
            } else {
                TaskStatus::parse(response.status.as_deref().unwrap_or(""))
            };

            match status {
                TaskStatus::Failed => {
                    task.status = TaskStatus::Failed;
                    return Err(ScrapeError::CaptchaUnsolved(format!(
                        "task {} failed: {}",
                        task.id,
                        response.error_message()
                    )));
                }
                TaskStatus::Ready => {
                    if let Some(token) = response.solution.and_then(Solution::into_token) {
                        task.status = TaskStatus::Ready;
                        task.token = Some(token);
                        break;
                    }
                    tracing::debug!("Task {} ready without a token, polling again", task.id);
                }
                TaskStatus::Processing => {
                    tracing::debug!("Task {} still processing", task.id);
                }
            }
        }

        task.take_token().ok_or_else(|| {
            ScrapeError::CaptchaUnsolved(format!(
                "no token for task {} within {:?}",
                task.id, self.timeout
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::Server) -> CapSolverClient {
        let config = CaptchaConfig {
            api_key: Some("test-key".to_string()),
            create_task_url: format!("{}/createTask", server.url()),
            get_result_url: format!("{}/getTaskResult", server.url()),
            ..Default::default()
        };
        CapSolverClient::from_config(HttpClient::new().unwrap(), &config)
            .unwrap()
            .with_polling(Duration::from_millis(5), Duration::from_secs(2))
    }

    #[test]
    fn test_no_key_no_client() {
        let config = CaptchaConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(CapSolverClient::from_config(HttpClient::new().unwrap(), &config).is_none());
    }

    #[tokio::test]
    async fn test_create_task_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/createTask")
            .match_body(Matcher::PartialJson(json!({
                "clientKey": "test-key",
                "task": {
                    "type": "AntiTurnstileTaskProxyLess",
                    "websiteURL": "https://dergipark.org.tr/tr/search-verification",
                    "websiteKey": "0xKEY"
                }
            })))
            .with_body(r#"{"errorId":0,"taskId":"task-1"}"#)
            .create_async()
            .await;

        let task = client(&server)
            .create_task(
                ChallengeKind::Turnstile,
                "https://dergipark.org.tr/tr/search-verification",
                "0xKEY",
            )
            .await
            .unwrap();

        assert_eq!(task.id, "task-1");
        assert_eq!(task.status, TaskStatus::Processing);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_task_error_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/createTask")
            .with_body(r#"{"errorId":1,"errorCode":"ERROR_KEY_DENIED_ACCESS"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .create_task(ChallengeKind::RecaptchaV2, "https://x", "6Lc")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::CaptchaUnsolved(ref m) if m.contains("ERROR_KEY_DENIED_ACCESS")));
    }

    #[tokio::test]
    async fn test_poll_until_ready() {
        let mut server = mockito::Server::new_async().await;
        let _processing = server
            .mock("POST", "/getTaskResult")
            .with_body(r#"{"errorId":0,"status":"processing"}"#)
            .expect(1)
            .create_async()
            .await;
        let _ready = server
            .mock("POST", "/getTaskResult")
            .with_body(r#"{"errorId":0,"status":"ready","solution":{"gRecaptchaResponse":"tok-123"}}"#)
            .create_async()
            .await;

        let mut task = CaptchaTask::new("task-1");
        let token = client(&server).wait_for_token(&mut task).await.unwrap();
        assert_eq!(token, "tok-123");
        assert_eq!(task.status, TaskStatus::Ready);
        assert!(task.token.is_none());
    }

    #[tokio::test]
    async fn test_poll_failed_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/getTaskResult")
            .with_body(r#"{"errorId":0,"status":"failed"}"#)
            .create_async()
            .await;

        let mut task = CaptchaTask::new("task-1");
        assert!(client(&server).wait_for_token(&mut task).await.is_err());
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_poll_aborts_after_transport_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/getTaskResult")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let mut task = CaptchaTask::new("task-1");
        let err = client(&server).wait_for_token(&mut task).await.unwrap_err();
        assert!(matches!(err, ScrapeError::CaptchaUnsolved(ref m) if m.contains("3 transport errors")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_timeout() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/getTaskResult")
            .with_body(r#"{"errorId":0,"status":"processing"}"#)
            .create_async()
            .await;

        let client = client(&server).with_polling(Duration::from_millis(10), Duration::from_millis(50));
        let mut task = CaptchaTask::new("task-1");
        assert!(client.wait_for_token(&mut task).await.is_err());
    }
}
