use crate::error::{Error, Result};
use crate::models::exam_session::ExamSession;
use crate::models::module_kind::ModuleKind;
use crate::models::staged_answer::StagedAnswerRecord;
use crate::services::session_service::SessionFlowController;
use crate::services::staging_service::AnswerStagingStore;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Submission endpoint for one module kind.
#[async_trait]
pub trait ModuleSubmitter: Send + Sync {
    async fn submit(&self, record: &StagedAnswerRecord) -> Result<()>;
}

/// The single terminal "complete" call of a session.
#[async_trait]
pub trait SessionFinalizer: Send + Sync {
    async fn complete(&self, session_id: Uuid) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }

    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds or attempts run out, doubling the backoff each time.
    /// Returns the last result and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt >= max_attempts => return (Err(e), attempt),
                Err(e) => {
                    let delay = self.backoff.saturating_mul(1 << (attempt - 1).min(10));
                    tracing::warn!(operation = %label, attempt, error = %e, "Attempt failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModuleSubmissionStatus {
    Submitted,
    AlreadySubmitted,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSubmissionReport {
    pub module: ModuleKind,
    pub test_id: String,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: ModuleSubmissionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalizeStatus {
    Completed,
    AlreadyCompleted,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub session_id: Uuid,
    pub modules: Vec<ModuleSubmissionReport>,
    pub finalize: FinalizeStatus,
    /// Where the candidate goes next. Always the results view, even after failures.
    pub results_path: String,
}

impl SubmissionOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(
            self.finalize,
            FinalizeStatus::Completed | FinalizeStatus::AlreadyCompleted
        )
    }

    pub fn failed_modules(&self) -> Vec<ModuleKind> {
        self.modules
            .iter()
            .filter(|m| matches!(m.status, ModuleSubmissionStatus::Failed { .. }))
            .map(|m| m.module)
            .collect()
    }
}

pub fn results_path(session_id: Uuid) -> String {
    format!("/api/sessions/{}/report", session_id)
}

/// Drains staged answers, submits each module independently and then finalizes the session.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    staging: AnswerStagingStore,
    flow: SessionFlowController,
    submitters: HashMap<ModuleKind, Arc<dyn ModuleSubmitter>>,
    finalizer: Arc<dyn SessionFinalizer>,
    retry: RetryPolicy,
}

impl SubmissionCoordinator {
    pub fn new(
        staging: AnswerStagingStore,
        flow: SessionFlowController,
        finalizer: Arc<dyn SessionFinalizer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            staging,
            flow,
            submitters: HashMap::new(),
            finalizer,
            retry,
        }
    }

    pub fn with_submitter(mut self, module: ModuleKind, submitter: Arc<dyn ModuleSubmitter>) -> Self {
        self.submitters.insert(module, submitter);
        self
    }

    pub fn with_submitter_for_all(mut self, submitter: Arc<dyn ModuleSubmitter>) -> Self {
        for module in ModuleKind::EXAM_ORDER {
            self.submitters.insert(module, submitter.clone());
        }
        self
    }

    /// Per-module failures never block the other modules or the finalize call, and a
    /// failed finalize still routes the candidate to results. The "already completed"
    /// flag is only set after finalize succeeds.
    pub async fn finalize_session(&self, session: &mut ExamSession) -> Result<SubmissionOutcome> {
        let session_id = session.id;
        if session.already_completed {
            tracing::debug!(session_id = %session_id, "Finalize requested for completed session");
            return Ok(SubmissionOutcome {
                session_id,
                modules: Vec::new(),
                finalize: FinalizeStatus::AlreadyCompleted,
                results_path: results_path(session_id),
            });
        }
        if !session.is_all_done() {
            return Err(Error::Conflict(format!(
                "Session {} still has modules in progress",
                session_id
            )));
        }

        let records = match self.staging.drain_all(session_id).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Could not read staged answers");
                Vec::new()
            }
        };

        let mut modules = Vec::with_capacity(records.len());
        for record in &records {
            let report = self.submit_module(session, record).await;
            if report.status == ModuleSubmissionStatus::Submitted {
                session.submitted_modules.push(record.module);
            }
            modules.push(report);
        }
        if let Err(e) = self.flow.save(session).await {
            tracing::error!(session_id = %session_id, error = %e, "Could not persist submission progress");
        }

        let (result, attempts) = self
            .retry
            .run("finalize", || self.finalizer.complete(session_id))
            .await;

        let finalize = match result {
            Ok(()) => {
                if let Err(e) = self.flow.mark_finalized(session).await {
                    tracing::error!(session_id = %session_id, error = %e, "Finalized session could not be persisted");
                }
                tracing::info!(session_id = %session_id, attempts, "Exam session finalized");
                FinalizeStatus::Completed
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    attempts,
                    error = %e,
                    "Finalize failed, routing candidate to results anyway"
                );
                self.flow.guard().release(session).await;
                if let Err(e) = self.flow.save(session).await {
                    tracing::error!(session_id = %session_id, error = %e, "Could not persist released integrity state");
                }
                FinalizeStatus::Failed { error: e.to_string() }
            }
        };

        Ok(SubmissionOutcome {
            session_id,
            modules,
            finalize,
            results_path: results_path(session_id),
        })
    }

    async fn submit_module(&self, session: &ExamSession, record: &StagedAnswerRecord) -> ModuleSubmissionReport {
        let mut report = ModuleSubmissionReport {
            module: record.module,
            test_id: record.test_id.clone(),
            attempts: 0,
            status: ModuleSubmissionStatus::Submitted,
        };

        if session.submitted_modules.contains(&record.module) {
            report.status = ModuleSubmissionStatus::AlreadySubmitted;
            return report;
        }

        let Some(submitter) = self.submitters.get(&record.module) else {
            tracing::error!(session_id = %session.id, module = %record.module, "No submitter registered");
            report.status = ModuleSubmissionStatus::Failed {
                error: format!("no submitter for {}", record.module),
            };
            return report;
        };

        let label = format!("submit {}", record.module);
        let (result, attempts) = self.retry.run(&label, || submitter.submit(record)).await;
        report.attempts = attempts;
        match result {
            Ok(()) => {
                tracing::info!(session_id = %session.id, module = %record.module, attempts, "Module answers submitted");
            }
            Err(e) => {
                tracing::error!(session_id = %session.id, module = %record.module, attempts, error = %e, "Module submission failed");
                report.status = ModuleSubmissionStatus::Failed { error: e.to_string() };
            }
        }
        report
    }
}
