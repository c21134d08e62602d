use crate::models::module_attempt::{AnswerPayload, ModuleAttempt};
use crate::models::module_kind::ModuleKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const NAMESPACE: &str = "exam";

/// Composite `(module, test)` key, namespaced per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingKey {
    pub session_id: Uuid,
    pub module: ModuleKind,
    pub test_id: String,
}

impl StagingKey {
    pub fn new(session_id: Uuid, module: ModuleKind, test_id: impl Into<String>) -> Self {
        Self {
            session_id,
            module,
            test_id: test_id.into(),
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{}{}:{}", staging_prefix(self.session_id), self.module, self.test_id)
    }
}

pub fn session_prefix(session_id: Uuid) -> String {
    format!("{}:{}:", NAMESPACE, session_id)
}

pub fn session_key(session_id: Uuid) -> String {
    format!("{}session", session_prefix(session_id))
}

pub fn staging_prefix(session_id: Uuid) -> String {
    format!("{}staged:", session_prefix(session_id))
}

pub fn all_sessions_prefix() -> String {
    format!("{}:", NAMESPACE)
}

/// Snapshot of a module attempt taken when the candidate submitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedAnswerRecord {
    pub session_id: Uuid,
    pub module: ModuleKind,
    pub test_id: String,
    pub answers: AnswerPayload,
    pub started_at: Option<DateTime<Utc>>,
    pub staged_at: DateTime<Utc>,
}

impl StagedAnswerRecord {
    pub fn from_attempt(session_id: Uuid, attempt: &ModuleAttempt) -> Self {
        Self {
            session_id,
            module: attempt.module,
            test_id: attempt.test_id.clone(),
            answers: attempt.answers.clone(),
            started_at: attempt.started_at,
            staged_at: Utc::now(),
        }
    }

    pub fn key(&self) -> StagingKey {
        StagingKey::new(self.session_id, self.module, self.test_id.clone())
    }
}
