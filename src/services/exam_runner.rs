use crate::error::{Error, Result};
use crate::models::exam_session::{ExamSession, FlowStep, IntegrityViolation};
use crate::models::module_attempt::ModuleAttempt;
use crate::models::module_kind::ModuleKind;
use crate::services::module_timer::{ActiveModule, ModuleTimer, SubmitTrigger};
use crate::services::session_service::SessionFlowController;
use crate::services::staging_service::AnswerStagingStore;
use crate::services::submission_service::{SubmissionCoordinator, SubmissionOutcome};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSubmitResult {
    pub step: FlowStep,
    pub session: ExamSession,
    pub finalize: Option<SubmissionOutcome>,
}

/// Serialises work on one session: two triggers for the same session never interleave.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(session_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn forget(&self, session_id: Uuid) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);
    }
}

/// Ties the flow controller, staging store and submission coordinator together.
/// Manual submits and timer expiry both end in [`ExamRunner::submit_module`].
pub struct ExamRunner {
    flow: SessionFlowController,
    staging: AnswerStagingStore,
    coordinator: SubmissionCoordinator,
    locks: SessionLocks,
    active: Mutex<HashMap<Uuid, Arc<ActiveModule>>>,
}

impl ExamRunner {
    pub fn new(
        flow: SessionFlowController,
        staging: AnswerStagingStore,
        coordinator: SubmissionCoordinator,
    ) -> Self {
        Self {
            flow,
            staging,
            coordinator,
            locks: SessionLocks::default(),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn flow(&self) -> &SessionFlowController {
        &self.flow
    }

    pub fn staging(&self) -> &AnswerStagingStore {
        &self.staging
    }

    pub async fn start_session(&self, modules: &[ModuleKind]) -> Result<ExamSession> {
        self.flow.start(modules).await
    }

    pub async fn enter_module(&self, session_id: Uuid, module: ModuleKind) -> Result<ExamSession> {
        let _lock = self.locks.acquire(session_id).await;
        let mut session = self.flow.get(session_id).await?;
        self.flow.enter_module(&mut session, module).await?;
        Ok(session)
    }

    /// Enters the current module, keeps it as the session's active module and, when the
    /// attempt has an expiry, arms the auto-submit timer.
    pub async fn begin_module(self: &Arc<Self>, session_id: Uuid, attempt: ModuleAttempt) -> Result<Arc<ActiveModule>> {
        self.enter_module(session_id, attempt.module).await?;

        let expires_at = attempt.expires_at;
        let active = Arc::new(ActiveModule::new(session_id, attempt));
        if let Some(expires_at) = expires_at {
            let remaining = (expires_at - Utc::now()).to_std().unwrap_or_default();
            let runner = Arc::clone(self);
            let timed = Arc::clone(&active);
            active.set_timer(ModuleTimer::start(remaining, move || async move {
                if let Err(e) = runner.submit_active(&timed, SubmitTrigger::Timeout).await {
                    tracing::error!(session_id = %timed.session_id, error = %e, "Auto-submit failed");
                }
            }));
        }

        let replaced = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id, Arc::clone(&active));
        if let Some(previous) = replaced {
            previous.cancel_timer();
        }
        Ok(active)
    }

    pub fn active_module(&self, session_id: Uuid) -> Option<Arc<ActiveModule>> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&session_id)
            .cloned()
    }

    fn release_active(&self, active: &ActiveModule) {
        let mut map = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if map
            .get(&active.session_id)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), active))
        {
            map.remove(&active.session_id);
        }
    }

    /// Records one answer into the active module. `Ok(false)` once a submit was accepted.
    pub fn record_answer(&self, session_id: Uuid, module: ModuleKind, question_id: &str, text: &str) -> Result<bool> {
        let active = self
            .active_module(session_id)
            .filter(|active| active.module() == module)
            .ok_or_else(|| Error::Conflict(format!("Module {} is not active in session {}", module, session_id)))?;
        Ok(active.record_answer(question_id, text))
    }

    /// Manual submit from the candidate. Goes through the active module's gate when one is
    /// running, so it cannot race the expiry timer; a lost race yields [`FlowStep::Noop`].
    pub async fn submit_manual(&self, session_id: Uuid, attempt: ModuleAttempt) -> Result<ModuleSubmitResult> {
        let Some(active) = self
            .active_module(session_id)
            .filter(|active| active.module() == attempt.module)
        else {
            return self.submit_module(session_id, &attempt).await;
        };

        active.merge_submitted(attempt);
        match self.submit_active(&active, SubmitTrigger::Manual).await? {
            Some(result) => Ok(result),
            None => Ok(ModuleSubmitResult {
                step: FlowStep::Noop,
                session: self.flow.get(session_id).await?,
                finalize: None,
            }),
        }
    }

    /// Returns `None` when another trigger already submitted this module.
    pub async fn submit_active(
        &self,
        active: &ActiveModule,
        trigger: SubmitTrigger,
    ) -> Result<Option<ModuleSubmitResult>> {
        if !active.gate().try_accept() {
            tracing::debug!(session_id = %active.session_id, trigger = ?trigger, "Submit already accepted");
            return Ok(None);
        }
        if trigger == SubmitTrigger::Manual {
            active.cancel_timer();
        }

        let snapshot = active.snapshot();
        match self.submit_module(active.session_id, &snapshot).await {
            Ok(result) => {
                self.release_active(active);
                tracing::info!(session_id = %active.session_id, module = %snapshot.module, trigger = ?trigger, "Module submitted");
                Ok(Some(result))
            }
            Err(e) => {
                active.gate().reopen();
                Err(e)
            }
        }
    }

    /// Stages the snapshot and completes the module. When it was the last module the
    /// session is finalized in the same call.
    pub async fn submit_module(&self, session_id: Uuid, attempt: &ModuleAttempt) -> Result<ModuleSubmitResult> {
        let _lock = self.locks.acquire(session_id).await;
        let mut session = self.flow.get(session_id).await?;

        if session.is_completed(attempt.module) {
            return Ok(ModuleSubmitResult {
                step: FlowStep::Noop,
                session,
                finalize: None,
            });
        }
        session.ensure_current(attempt.module)?;

        self.staging.stage(session_id, attempt).await?;
        let step = self
            .flow
            .complete_current(&mut session, attempt.module, &attempt.test_id)
            .await?;

        let finalize = if step == FlowStep::Finalize {
            Some(self.coordinator.finalize_session(&mut session).await?)
        } else {
            None
        };

        Ok(ModuleSubmitResult {
            step,
            session,
            finalize,
        })
    }

    /// Retry path for a session whose finalize call failed earlier.
    pub async fn finalize(&self, session_id: Uuid) -> Result<SubmissionOutcome> {
        let _lock = self.locks.acquire(session_id).await;
        let mut session = self.flow.get(session_id).await?;
        self.coordinator.finalize_session(&mut session).await
    }

    pub async fn report_violation(
        &self,
        session_id: Uuid,
        kind: &str,
        detail: Option<String>,
    ) -> Result<IntegrityViolation> {
        let _lock = self.locks.acquire(session_id).await;
        let mut session = self.flow.get(session_id).await?;
        let violation = self.flow.guard().report_violation(&mut session, kind, detail);
        self.flow.save(&mut session).await?;
        Ok(violation)
    }

    /// Drops sessions and staged answers that are finalized or idle past `retention`.
    pub async fn sweep_expired(&self, retention: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - retention;
        let mut removed = 0;
        for session in self.flow.list_sessions().await? {
            if session.updated_at >= cutoff {
                continue;
            }
            let _lock = self.locks.acquire(session.id).await;
            let cleared = self.staging.clear(session.id).await?;
            self.flow.discard(session.id).await?;
            self.locks.forget(session.id);
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner()).remove(&session.id);
            if let Some(active) = active {
                active.cancel_timer();
            }
            tracing::info!(
                session_id = %session.id,
                finalized = session.already_completed,
                staged_entries = cleared,
                "Expired exam session removed"
            );
            removed += 1;
        }
        Ok(removed)
    }
}
