use crate::error::{Error, Result};
use crate::models::exam_result::ExamResult;
use crate::models::module_attempt::AnswerPayload;
use crate::models::staged_answer::StagedAnswerRecord;
use crate::services::report_service::ResultsProvider;
use crate::services::submission_service::{ModuleSubmitter, SessionFinalizer};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// HTTP client for the exam backend: per-module submission, session completion and results.
#[derive(Clone)]
pub struct ExamApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ExamApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let token = token.filter(|t| !t.trim().is_empty());

        info!("Exam API client configured for {}", base_url);
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(endpoint: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(endpoint = %endpoint, status = status.as_u16(), body = %body, "Exam API rejected request");
        Err(Error::Upstream {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }

    /// Reading and listening send an id → text map, writing and speaking the section tree.
    fn submission_body(record: &StagedAnswerRecord) -> JsonValue {
        let mut body = json!({
            "session_id": record.session_id,
            "test_id": record.test_id,
            "module": record.module,
            "started_at": record.started_at,
            "submitted_at": record.staged_at,
        });
        let field = match &record.answers {
            AnswerPayload::Flat(_) => "answers",
            AnswerPayload::Sections(_) => "sections",
        };
        if let Some(map) = body.as_object_mut() {
            map.insert(field.to_string(), json!(record.answers));
        }
        body
    }
}

#[async_trait]
impl ModuleSubmitter for ExamApiClient {
    async fn submit(&self, record: &StagedAnswerRecord) -> Result<()> {
        let endpoint = format!("{}/submit", record.module);
        let response = self
            .authorize(self.client.post(self.url(&endpoint)))
            .json(&Self::submission_body(record))
            .send()
            .await?;
        Self::check(&endpoint, response).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionFinalizer for ExamApiClient {
    async fn complete(&self, session_id: Uuid) -> Result<()> {
        let endpoint = format!("sessions/{}/complete", session_id);
        let response = self
            .authorize(self.client.post(self.url(&endpoint)))
            .json(&json!({ "session_id": session_id }))
            .send()
            .await?;
        Self::check(&endpoint, response).await?;
        Ok(())
    }
}

#[async_trait]
impl ResultsProvider for ExamApiClient {
    async fn fetch_results(&self, session_id: Uuid) -> Result<ExamResult> {
        let endpoint = format!("sessions/{}/results", session_id);
        let response = self
            .authorize(self.client.get(self.url(&endpoint)))
            .send()
            .await?;
        let response = Self::check(&endpoint, response).await?;

        // some deployments wrap the payload in { "data": ... }
        let body: JsonValue = response.json().await?;
        let payload = match body.get("data") {
            Some(data) if data.is_object() => data.clone(),
            _ => body,
        };
        Ok(serde_json::from_value(payload)?)
    }
}
