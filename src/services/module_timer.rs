use crate::models::module_attempt::ModuleAttempt;
use crate::models::module_kind::ModuleKind;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    Timeout,
}

/// Closes the instant the first submit trigger is accepted, before any async work starts.
#[derive(Debug, Clone, Default)]
pub struct SubmitGate(Arc<AtomicBool>);

impl SubmitGate {
    pub fn try_accept(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Lets the candidate retry after a staging failure.
    pub fn reopen(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The module the candidate is currently working in.
pub struct ActiveModule {
    pub session_id: Uuid,
    attempt: Mutex<ModuleAttempt>,
    gate: SubmitGate,
    timer: Mutex<Option<ModuleTimer>>,
}

impl ActiveModule {
    pub fn new(session_id: Uuid, attempt: ModuleAttempt) -> Self {
        Self {
            session_id,
            attempt: Mutex::new(attempt),
            gate: SubmitGate::default(),
            timer: Mutex::new(None),
        }
    }

    /// Ignored once a submit has been accepted.
    pub fn record_answer(&self, question_id: &str, text: &str) -> bool {
        if self.gate.is_closed() {
            return false;
        }
        let mut attempt = self.attempt.lock().unwrap_or_else(|e| e.into_inner());
        attempt.answers.set_answer(question_id, text)
    }

    /// Answers posted with a manual submit replace the recorded ones; an empty body keeps them.
    pub fn merge_submitted(&self, submitted: ModuleAttempt) -> bool {
        if self.gate.is_closed() {
            return false;
        }
        let mut attempt = self.attempt.lock().unwrap_or_else(|e| e.into_inner());
        if !submitted.answers.is_empty() {
            attempt.answers = submitted.answers;
        }
        attempt.test_id = submitted.test_id;
        true
    }

    pub fn module(&self) -> ModuleKind {
        self.attempt.lock().unwrap_or_else(|e| e.into_inner()).module
    }

    pub fn snapshot(&self) -> ModuleAttempt {
        self.attempt.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn gate(&self) -> &SubmitGate {
        &self.gate
    }

    pub fn set_timer(&self, timer: ModuleTimer) {
        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(timer);
    }

    pub fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            timer.cancel();
        }
    }
}

/// Countdown that fires the auto-submit callback at expiry.
pub struct ModuleTimer {
    handle: JoinHandle<()>,
}

impl ModuleTimer {
    pub fn start<F, Fut>(remaining: Duration, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            on_expire().await;
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}
