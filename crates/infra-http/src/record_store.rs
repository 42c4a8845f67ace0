// Record store reporter
// One GraphQL mutation per status change, keyed by chat id

use async_trait::async_trait;
use findoc_core::domain::JobStatus;
use findoc_core::port::{ReportError, StatusReporter};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::DEFAULT_SECRET_HEADER;

/// Sets `status` and `analysis_result` on the chat row
pub const UPDATE_CHAT_MUTATION: &str = r#"
mutation UpdateChat($id: uuid!, $status: String!, $result: String) {
  update_chats_by_pk(pk_columns: {id: $id}, _set: {status: $status, analysis_result: $result}) {
    id
  }
}
"#;

#[derive(Debug, Clone)]
pub struct RecordStoreSettings {
    /// GraphQL endpoint
    pub graphql_url: String,
    pub admin_secret: Option<String>,
    pub secret_header: String,
    pub timeout: Duration,
}

impl RecordStoreSettings {
    pub fn new(graphql_url: impl Into<String>) -> Self {
        Self {
            graphql_url: graphql_url.into(),
            admin_secret: None,
            secret_header: DEFAULT_SECRET_HEADER.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_admin_secret(mut self, secret: Option<String>) -> Self {
        self.admin_secret = secret;
        self
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Clone)]
pub struct GraphQlStatusReporter {
    settings: RecordStoreSettings,
    client: reqwest::Client,
}

impl GraphQlStatusReporter {
    pub fn new(settings: RecordStoreSettings) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ReportError::Transport(e.to_string()))?;
        Ok(Self { settings, client })
    }

    async fn send(
        &self,
        chat_id: &str,
        status: JobStatus,
        result: Option<&str>,
    ) -> Result<(), ReportError> {
        // An empty result is recorded as null
        let result = result.filter(|r| !r.is_empty());
        let body = json!({
            "query": UPDATE_CHAT_MUTATION,
            "variables": {
                "id": chat_id,
                "status": status.as_str(),
                "result": result,
            },
        });

        let mut request = self.client.post(&self.settings.graphql_url).json(&body);
        if let Some(secret) = &self.settings.admin_secret {
            request = request.header(self.settings.secret_header.as_str(), secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(ReportError::HttpStatus(http_status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        // GraphQL reports failures with 200 and an `errors` array
        match serde_json::from_str::<GraphQlResponse>(&text) {
            Ok(GraphQlResponse {
                errors: Some(errors),
            }) if !errors.is_empty() => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
                Err(ReportError::Rejected(messages.join("; ")))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(error = %e, "Record store reply is not GraphQL JSON");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl StatusReporter for GraphQlStatusReporter {
    async fn report(
        &self,
        chat_id: &str,
        status: JobStatus,
        result: Option<&str>,
    ) -> Result<(), ReportError> {
        match self.send(chat_id, status, result).await {
            Ok(()) => {
                debug!(chat_id, status = %status, "Record store updated");
                Ok(())
            }
            Err(e) => {
                warn!(chat_id, status = %status, error = %e, "Record store update failed");
                Err(e)
            }
        }
    }
}
