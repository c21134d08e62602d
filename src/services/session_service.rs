use crate::database::store::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::exam_session::{ExamSession, FlowStep};
use crate::models::module_kind::ModuleKind;
use crate::models::staged_answer::{all_sessions_prefix, session_key};
use crate::services::integrity_service::IntegrityGuard;
use std::sync::Arc;
use uuid::Uuid;

/// Sequences the modules of a session and persists its state through the storage port,
/// so an abandoned session resumes where it stopped.
#[derive(Clone)]
pub struct SessionFlowController {
    store: Arc<dyn KeyValueStore>,
    guard: IntegrityGuard,
}

impl SessionFlowController {
    pub fn new(store: Arc<dyn KeyValueStore>, guard: IntegrityGuard) -> Self {
        Self { store, guard }
    }

    pub async fn start(&self, modules: &[ModuleKind]) -> Result<ExamSession> {
        let mut session = ExamSession::new(Uuid::new_v4(), modules)?;
        let first = session.start()?;
        self.guard.arm(&mut session).await;
        self.save(&mut session).await?;

        tracing::info!(
            session_id = %session.id,
            modules = ?session.required_modules,
            first = %first,
            "Exam session started"
        );
        Ok(session)
    }

    pub async fn load(&self, session_id: Uuid) -> Result<Option<ExamSession>> {
        match self.store.get(&session_key(session_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, session_id: Uuid) -> Result<ExamSession> {
        self.load(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Exam session {} not found", session_id)))
    }

    pub async fn save(&self, session: &mut ExamSession) -> Result<()> {
        session.touch();
        let value = serde_json::to_value(&*session)?;
        self.store.put(&session_key(session.id), value).await
    }

    /// Resumes the active module after a reload.
    pub async fn enter_module(&self, session: &mut ExamSession, module: ModuleKind) -> Result<()> {
        session.ensure_current(module)?;
        self.guard.arm(session).await;
        self.save(session).await
    }

    /// Marks `module` complete and re-arms the guard for the next module. Returns
    /// [`FlowStep::Finalize`] once, when the last required module completes.
    pub async fn complete_current(
        &self,
        session: &mut ExamSession,
        module: ModuleKind,
        test_id: &str,
    ) -> Result<FlowStep> {
        let step = session.complete_module(module, test_id)?;
        if step == FlowStep::Noop {
            tracing::debug!(session_id = %session.id, module = %module, "Duplicate completion ignored");
            return Ok(step);
        }

        self.guard.disarm(session).await;
        if let FlowStep::Next(next) = step {
            self.guard.arm(session).await;
            tracing::info!(session_id = %session.id, completed = %module, next = %next, "Module completed");
        } else {
            tracing::info!(session_id = %session.id, completed = %module, "All modules completed, awaiting finalize");
        }
        self.save(session).await?;
        Ok(step)
    }

    pub fn is_all_done(&self, session: &ExamSession) -> bool {
        session.is_all_done()
    }

    pub fn has_active_session(&self, session: &ExamSession) -> bool {
        session.has_active_session()
    }

    /// Sets the "already completed" flag. Only called after finalize succeeded.
    pub async fn mark_finalized(&self, session: &mut ExamSession) -> Result<bool> {
        let changed = session.mark_finalized();
        self.guard.disarm(session).await;
        if changed {
            self.save(session).await?;
        }
        Ok(changed)
    }

    pub fn guard(&self) -> &IntegrityGuard {
        &self.guard
    }

    pub async fn list_sessions(&self) -> Result<Vec<ExamSession>> {
        let prefix = all_sessions_prefix();
        let entries = self.store.scan_prefix(&prefix).await?;
        Ok(entries
            .into_iter()
            // "exam:{id}:session", never a staged entry whose test id happens to be "session"
            .filter(|(key, _)| {
                key.strip_prefix(&prefix)
                    .is_some_and(|rest| rest.split(':').count() == 2 && rest.ends_with(":session"))
            })
            .filter_map(|(_, value)| serde_json::from_value(value).ok())
            .collect())
    }

    pub async fn discard(&self, session_id: Uuid) -> Result<()> {
        self.store.delete(&session_key(session_id)).await
    }
}
