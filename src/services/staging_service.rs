use crate::database::store::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::module_attempt::ModuleAttempt;
use crate::models::module_kind::ModuleKind;
use crate::models::staged_answer::{staging_prefix, StagedAnswerRecord, StagingKey};
use std::sync::Arc;
use uuid::Uuid;

/// Per-session persistence of submitted module snapshots until finalize.
#[derive(Clone)]
pub struct AnswerStagingStore {
    store: Arc<dyn KeyValueStore>,
}

impl AnswerStagingStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Writes the full snapshot for `(module, test)`, replacing any earlier one.
    /// Failures are returned as [`Error::Staging`] so the candidate can retry.
    pub async fn stage(&self, session_id: Uuid, attempt: &ModuleAttempt) -> Result<StagedAnswerRecord> {
        let record = StagedAnswerRecord::from_attempt(session_id, attempt);
        let key = record.key().storage_key();
        let value = serde_json::to_value(&record)
            .map_err(|e| Error::Staging(format!("Could not encode answers for {}: {}", key, e)))?;

        self.store.put(&key, value).await.map_err(|e| {
            tracing::error!(session_id = %session_id, module = %attempt.module, error = %e, "Staging write failed");
            Error::Staging(format!(
                "Could not save your {} answers, please try again",
                attempt.module
            ))
        })?;

        tracing::info!(
            session_id = %session_id,
            module = %attempt.module,
            test_id = %attempt.test_id,
            answers = attempt.answers.len(),
            "Staged module answers"
        );
        Ok(record)
    }

    pub async fn load(
        &self,
        session_id: Uuid,
        module: ModuleKind,
        test_id: &str,
    ) -> Result<Option<StagedAnswerRecord>> {
        let key = StagingKey::new(session_id, module, test_id).storage_key();
        match self.store.get(&key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Every staged record of the session, in exam order. The caller does not need to know
    /// which modules were attempted. Undecodable entries are skipped.
    pub async fn drain_all(&self, session_id: Uuid) -> Result<Vec<StagedAnswerRecord>> {
        let entries = self.store.scan_prefix(&staging_prefix(session_id)).await?;
        let mut records: Vec<StagedAnswerRecord> = entries
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping undecodable staged entry");
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| {
            a.module
                .exam_position()
                .cmp(&b.module.exam_position())
                .then_with(|| a.test_id.cmp(&b.test_id))
        });
        Ok(records)
    }

    pub async fn clear(&self, session_id: Uuid) -> Result<usize> {
        let entries = self.store.scan_prefix(&staging_prefix(session_id)).await?;
        for (key, _) in &entries {
            self.store.delete(key).await?;
        }
        Ok(entries.len())
    }
}
