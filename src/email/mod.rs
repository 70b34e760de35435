use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email client error: {0}")]
    ClientError(String),
    #[error("Email service error: {0}")]
    ServiceError(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_base64: String,
}

impl EmailAttachment {
    pub fn from_pdf(filename: &str, bytes: &[u8]) -> Self {
        Self {
            filename: filename.to_string(),
            content_base64: BASE64.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Structured estimate payload the service renders into its template.
    pub estimate: serde_json::Value,
    pub attachment: Option<EmailAttachment>,
}

/// `demo_mode` signals the sandboxed service only delivers to verified
/// addresses; surfaced to the caller so the UI can say so.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailOutcome {
    #[serde(rename = "success")]
    pub delivered: bool,
    #[serde(default)]
    pub demo_mode: bool,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct EmailService {
    service_url: String,
    client: reqwest::Client,
}

impl EmailService {
    pub fn new(service_url: &str) -> Self {
        Self {
            service_url: service_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// No automatic retry: failures come back to the caller, who decides
    /// whether to offer a manual retry.
    pub async fn send_estimate(&self, request: &EmailRequest) -> Result<EmailOutcome, EmailError> {
        info!(to = %request.to, "sending estimate email");
        let response = self
            .client
            .post(&self.service_url)
            .timeout(Duration::from_secs(30))
            .json(request)
            .send()
            .await
            .map_err(|e| EmailError::ClientError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmailError::ServiceError(format!(
                "{}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| EmailError::ClientError(e.to_string()))
    }
}
