use crate::message::{AlertLevel, AlertMessage};
use crate::sink::{AlertSink, SinkResult};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

fn render_body(alert: &AlertMessage) -> String {
    let mut body = format!("{}\n\nScope: {}\nLevel: {:?}", alert.summary, alert.scope, alert.level);
    if let Some(window) = &alert.window {
        body.push_str(&format!("\nWindow: {} .. {}", window.start, window.end));
    }
    if !alert.affected_entities.is_empty() {
        body.push_str(&format!(
            "\nAffected: {}",
            alert.affected_entities.join(", ")
        ));
    }
    if !alert.sample_events.is_empty() {
        let samples: Vec<String> = alert
            .sample_events
            .iter()
            .map(|id| id.to_string())
            .collect();
        body.push_str(&format!("\nSample events: {}", samples.join(", ")));
    }
    body.push_str(&format!("\nTime: {}", alert.timestamp));
    body
}

// ============================================================================
// 邮件投递
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

pub struct EmailSink {
    config: EmailConfig,
    enabled: bool,
}

impl EmailSink {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            enabled: true,
        }
    }
}

#[async_trait]
impl AlertSink for EmailSink {
    async fn deliver(&self, alert: &AlertMessage) -> Result<SinkResult> {
        use lettre::message::header::ContentType;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

        let subject = format!("[VIGIL {:?}] {}", alert.level, alert.scope);

        let mut builder = Message::builder()
            .from(self.config.from.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for to in &self.config.to {
            builder = builder.to(to.parse()?);
        }
        let email = builder.body(render_body(alert))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)?
            .credentials(creds)
            .port(self.config.smtp_port)
            .build();

        match mailer.send(email).await {
            Ok(_) => Ok(SinkResult::success()),
            Err(e) => Ok(SinkResult::failure(format!("Email send failed: {}", e))),
        }
    }

    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// ============================================================================
// Webhook 投递
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub headers: Option<std::collections::HashMap<String, String>>,
}

pub struct WebhookSink {
    config: WebhookConfig,
    client: reqwest::Client,
    enabled: bool,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            enabled: true,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, alert: &AlertMessage) -> Result<SinkResult> {
        let mut request = self.client.post(&self.config.url);

        if let Some(headers) = &self.config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(alert).send().await?;

        if response.status().is_success() {
            Ok(SinkResult::success())
        } else {
            Ok(SinkResult::failure(format!(
                "Webhook failed with status: {}",
                response.status()
            )))
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// ============================================================================
// 日志投递（运维兜底渠道）
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: &AlertMessage) -> Result<SinkResult> {
        match alert.level {
            AlertLevel::Info => info!(scope = %alert.scope, summary = %alert.summary, "ALERT"),
            AlertLevel::Warning => warn!(scope = %alert.scope, summary = %alert.summary, "ALERT"),
            AlertLevel::Error | AlertLevel::Critical => {
                error!(
                    scope = %alert.scope,
                    summary = %alert.summary,
                    affected = ?alert.affected_entities,
                    "ALERT"
                )
            }
        }
        Ok(SinkResult::success())
    }

    fn name(&self) -> &str {
        "log"
    }
}
