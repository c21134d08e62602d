use crate::models::module_attempt::{AnswerPayload, ModuleAttempt};
use crate::models::module_kind::ModuleKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, max = 4), custom(function = "validate_distinct_modules"))]
    pub modules: Vec<ModuleKind>,
}

fn validate_distinct_modules(modules: &[ModuleKind]) -> Result<(), ValidationError> {
    for (idx, module) in modules.iter().enumerate() {
        if modules[..idx].contains(module) {
            return Err(ValidationError::new("duplicate_module"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitModuleRequest {
    #[validate(length(min = 1, max = 128))]
    pub test_id: String,
    #[serde(default)]
    pub answers: AnswerPayload,
    pub started_at: Option<DateTime<Utc>>,
}

impl SubmitModuleRequest {
    pub fn into_attempt(self, module: ModuleKind) -> ModuleAttempt {
        let mut attempt = ModuleAttempt::new(module, self.test_id, self.answers);
        if self.started_at.is_some() {
            attempt.started_at = self.started_at;
        }
        attempt
    }
}

/// Body of `enter`: without one the module is entered untimed.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnterModuleRequest {
    #[validate(length(min = 1, max = 128))]
    pub test_id: String,
    #[serde(default)]
    pub answers: AnswerPayload,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 14400))]
    pub duration_seconds: Option<i64>,
}

impl EnterModuleRequest {
    pub fn into_attempt(self, module: ModuleKind) -> ModuleAttempt {
        let expires_at = self
            .expires_at
            .or_else(|| self.duration_seconds.map(|secs| Utc::now() + chrono::Duration::seconds(secs)));
        let mut attempt = ModuleAttempt::new(module, self.test_id, self.answers);
        attempt.expires_at = expires_at;
        attempt
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    #[validate(length(min = 1, max = 128))]
    pub question_id: String,
    #[validate(length(max = 20000))]
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ViolationRequest {
    #[validate(length(min = 1, max = 64))]
    pub kind: String,
    #[validate(length(max = 1000))]
    pub detail: Option<String>,
}
