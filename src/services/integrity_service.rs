use crate::models::exam_session::{ExamSession, IntegrityViolation};
use async_trait::async_trait;
use std::sync::Arc;

/// The host refused an integrity effect. Never fatal.
#[derive(Debug, Clone, thiserror::Error)]
#[error("host denied {0}")]
pub struct HostDenied(pub String);

/// Exam-condition effects a presentation host can apply.
#[async_trait]
pub trait IntegrityHost: Send + Sync {
    async fn request_fullscreen(&self) -> std::result::Result<(), HostDenied>;
    async fn exit_fullscreen(&self);
    /// Back navigation re-pushes the current location while locked.
    fn set_back_navigation_lock(&self, locked: bool);
    fn set_close_confirmation(&self, enabled: bool);
}

/// Hosts without full-screen or navigation concepts, such as this server.
pub struct NoopIntegrityHost;

#[async_trait]
impl IntegrityHost for NoopIntegrityHost {
    async fn request_fullscreen(&self) -> std::result::Result<(), HostDenied> {
        Ok(())
    }

    async fn exit_fullscreen(&self) {}

    fn set_back_navigation_lock(&self, _locked: bool) {}

    fn set_close_confirmation(&self, _enabled: bool) {}
}

/// Arms and disarms exam conditions for one session. State lives on the session record,
/// so independent sessions never share flags.
#[derive(Clone)]
pub struct IntegrityGuard {
    host: Arc<dyn IntegrityHost>,
}

impl IntegrityGuard {
    pub fn new(host: Arc<dyn IntegrityHost>) -> Self {
        Self { host }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopIntegrityHost))
    }

    /// Idempotent while already armed.
    pub async fn arm(&self, session: &mut ExamSession) {
        if session.integrity.armed {
            return;
        }

        if !session.integrity.fullscreen_held {
            match self.host.request_fullscreen().await {
                Ok(()) => session.integrity.fullscreen_held = true,
                Err(e) => tracing::debug!(session_id = %session.id, error = %e, "Full-screen request rejected"),
            }
        }
        self.host.set_back_navigation_lock(true);
        self.host.set_close_confirmation(true);
        session.integrity.armed = true;
    }

    /// Full-screen is released only once no module of the session will re-arm it.
    pub async fn disarm(&self, session: &mut ExamSession) {
        if session.integrity.armed {
            self.host.set_back_navigation_lock(false);
            self.host.set_close_confirmation(false);
            session.integrity.armed = false;
        }

        if session.integrity.fullscreen_held && !session.has_active_session() {
            self.host.exit_fullscreen().await;
            session.integrity.fullscreen_held = false;
        }
    }

    /// Drops every effect, full-screen included. Used once the candidate has been routed
    /// to results, even while the finalize call is still pending a retry.
    pub async fn release(&self, session: &mut ExamSession) {
        self.disarm(session).await;
        if session.integrity.fullscreen_held {
            self.host.exit_fullscreen().await;
            session.integrity.fullscreen_held = false;
        }
    }

    pub fn report_violation(
        &self,
        session: &mut ExamSession,
        kind: &str,
        detail: Option<String>,
    ) -> IntegrityViolation {
        let violation = session.record_violation(kind, detail).clone();
        tracing::warn!(
            session_id = %session.id,
            kind = %violation.kind,
            count = violation.count,
            "Integrity violation recorded"
        );
        violation
    }
}
