//! Notification sinks for Home Assistant hosts

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy},
    notification::{Notification, NotificationLevel, NotificationSink},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Environment variable holding the supervisor API token
pub const SUPERVISOR_TOKEN_ENV: &str = "SUPERVISOR_TOKEN";

/// Default supervisor API base URL inside an add-on container
pub const DEFAULT_SUPERVISOR_URL: &str = "http://supervisor";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends notifications through the Home Assistant `notify` service
pub struct SupervisorNotifier {
    http: Arc<dyn HttpClient>,
    base_url: String,
    token: String,
    service: String,
}

impl SupervisorNotifier {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        token: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            service: service.into(),
        }
    }

    /// Build a notifier from `SUPERVISOR_TOKEN`, or `None` when it is unset
    pub fn from_env(http: Arc<dyn HttpClient>, service: impl Into<String>) -> Option<Self> {
        let token = std::env::var(SUPERVISOR_TOKEN_ENV).ok()?;
        if token.trim().is_empty() {
            return None;
        }
        Some(Self::new(http, DEFAULT_SUPERVISOR_URL, token, service))
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn notify_url(&self) -> String {
        format!(
            "{}/core/api/services/notify/{}",
            self.base_url, self.service
        )
    }
}

#[async_trait]
impl NotificationSink for SupervisorNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        let payload = json!({
            "title": notification.title,
            "message": notification.message,
            "data": { "importance": notification.level.as_str() },
        });

        let request = HttpRequest::new(HttpMethod::Post, self.notify_url())
            .bearer_token(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)?;

        let response = self
            .http
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;

        if response.is_success() {
            debug!(
                service = %self.service,
                title = %notification.title,
                "Notification delivered"
            );
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            warn!(
                service = %self.service,
                status = response.status,
                "Notification rejected by supervisor"
            );
            Err(BridgeError::OperationFailed(format!(
                "Notify service returned HTTP {}: {}",
                response.status, body
            )))
        }
    }

    async fn test_connection(&self) -> Result<bool> {
        let request = HttpRequest::new(HttpMethod::Get, format!("{}/core/api/", self.base_url))
            .bearer_token(&self.token)
            .timeout(REQUEST_TIMEOUT);

        match self
            .http
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
        {
            Ok(response) => Ok(response.is_success()),
            Err(e) => {
                warn!(error = %e, "Supervisor API unreachable");
                Ok(false)
            }
        }
    }
}

/// Writes notifications to the log instead of delivering them
///
/// Used when no supervisor token is available (running outside an add-on).
#[derive(Debug, Clone)]
pub struct LogNotifier {
    service: String,
}

impl LogNotifier {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        match notification.level {
            NotificationLevel::Info => info!(
                service = %self.service,
                title = %notification.title,
                "{}", notification.message
            ),
            NotificationLevel::Warning => warn!(
                service = %self.service,
                title = %notification.title,
                "{}", notification.message
            ),
            NotificationLevel::Error => error!(
                service = %self.service,
                title = %notification.title,
                "{}", notification.message
            ),
        }
        Ok(())
    }

    async fn test_connection(&self) -> Result<bool> {
        Ok(false)
    }
}
