//! CAPTCHA challenge kinds and solving-service task state.

use serde::{Deserialize, Serialize};

/// Site keys with this prefix belong to Cloudflare Turnstile
pub const TURNSTILE_KEY_PREFIX: &str = "0x";

/// Kind of challenge embedded in a verification page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeKind {
    Turnstile,
    RecaptchaV2,
}

impl ChallengeKind {
    /// Classify a site key by its prefix
    pub fn from_site_key(site_key: &str) -> Self {
        if site_key.starts_with(TURNSTILE_KEY_PREFIX) {
            ChallengeKind::Turnstile
        } else {
            ChallengeKind::RecaptchaV2
        }
    }

    /// Solving-service task type
    pub fn task_type(&self) -> &'static str {
        match self {
            ChallengeKind::Turnstile => "AntiTurnstileTaskProxyLess",
            ChallengeKind::RecaptchaV2 => "ReCaptchaV2TaskProxyLess",
        }
    }

    /// Selector of the hidden input receiving the token
    pub fn response_selector(&self) -> &'static str {
        match self {
            ChallengeKind::Turnstile => r#"input[name="cf-turnstile-response"]"#,
            ChallengeKind::RecaptchaV2 => "#g-recaptcha-response",
        }
    }

    /// DOM events fired on the response element after injection
    pub fn dispatch_events(&self) -> &'static [&'static str] {
        match self {
            ChallengeKind::Turnstile => &["input", "change"],
            ChallengeKind::RecaptchaV2 => &["change"],
        }
    }
}

/// Status of a solving task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Processing,
    Ready,
    Failed,
}

impl TaskStatus {
    /// Map the service's status string
    pub fn parse(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "ready" => TaskStatus::Ready,
            "failed" | "error" => TaskStatus::Failed,
            _ => TaskStatus::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Processing)
    }
}

/// A solving task being polled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaTask {
    pub id: String,
    pub status: TaskStatus,
    pub token: Option<String>,
}

impl CaptchaTask {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Processing,
            token: None,
        }
    }

    /// Take the token out of the task; it can only be used once
    pub fn take_token(&mut self) -> Option<String> {
        self.token.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_site_key() {
        assert_eq!(
            ChallengeKind::from_site_key("0x4AAAAAAADnPIDROrmt1Wwj"),
            ChallengeKind::Turnstile
        );
        assert_eq!(
            ChallengeKind::from_site_key("6LfD3PIbAAAAAJs_eEHvoOl75_83eXSqpPSRFJ_u"),
            ChallengeKind::RecaptchaV2
        );
        assert_eq!(ChallengeKind::from_site_key(""), ChallengeKind::RecaptchaV2);
        assert_eq!(
            ChallengeKind::Turnstile.task_type(),
            "AntiTurnstileTaskProxyLess"
        );
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(TaskStatus::parse("ready"), TaskStatus::Ready);
        assert_eq!(TaskStatus::parse("failed"), TaskStatus::Failed);
        assert_eq!(TaskStatus::parse("error"), TaskStatus::Failed);
        assert_eq!(TaskStatus::parse("processing"), TaskStatus::Processing);
        assert!(!TaskStatus::Processing.is_terminal());
    }

    #[test]
    fn test_token_single_use() {
        let mut task = CaptchaTask::new("t-1");
        task.token = Some("tok".to_string());
        assert_eq!(task.take_token().as_deref(), Some("tok"));
        assert!(task.take_token().is_none());
    }
}
