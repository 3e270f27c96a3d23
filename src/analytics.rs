//! Best-effort usage reporting

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::ServerSettings;
use crate::error::DevError;

/// One `dev` command report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevEvent {
    pub command: &'static str,
    pub project_type: String,
    pub live: bool,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl DevEvent {
    pub fn new(settings: &ServerSettings, live: bool) -> Self {
        let project_type = match (&settings.framework, settings.no_cmd) {
            (Some(framework), _) => framework.clone(),
            (None, true) => "static".to_string(),
            (None, false) => "custom".to_string(),
        };
        Self {
            command: "dev",
            project_type,
            live,
            session_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AnalyticsReporter: Send + Sync {
    async fn report(&self, event: &DevEvent) -> Result<(), DevError>;
}

/// Emits the event as a structured log record
#[derive(Debug, Clone, Default)]
pub struct LogAnalytics;

#[async_trait]
impl AnalyticsReporter for LogAnalytics {
    async fn report(&self, event: &DevEvent) -> Result<(), DevError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| DevError::Io(std::io::Error::other(e)))?;
        info!(target: "netlify_dev::analytics", event = %payload, "command");
        Ok(())
    }
}
