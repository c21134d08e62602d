use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use exam_session_backend::database::store::MemoryKeyValueStore;
use exam_session_backend::error::{Error, Result as ExamResult};
use exam_session_backend::models::exam_session::{FlowStep, SessionState};
use exam_session_backend::models::module_kind::ModuleKind;
use exam_session_backend::services::integrity_service::{HostDenied, IntegrityGuard, IntegrityHost};
use exam_session_backend::services::session_service::SessionFlowController;
use exam_session_backend::services::staging_service::AnswerStagingStore;
use exam_session_backend::services::submission_service::{
    FinalizeStatus, RetryPolicy, SessionFinalizer, SubmissionCoordinator,
};
use uuid::Uuid;

fn controller() -> SessionFlowController {
    SessionFlowController::new(Arc::new(MemoryKeyValueStore::new()), IntegrityGuard::noop())
}

fn permutations(items: &[ModuleKind]) -> Vec<Vec<ModuleKind>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for idx in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(idx);
        for mut tail in permutations(&rest) {
            tail.insert(0, head);
            out.push(tail);
        }
    }
    out
}

#[tokio::test]
async fn every_ordering_visits_each_module_once_then_finalizes_once() {
    let flow = controller();

    for mask in 1u8..16 {
        let subset: Vec<ModuleKind> = ModuleKind::EXAM_ORDER
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, m)| *m)
            .collect();

        for ordering in permutations(&subset) {
            let mut session = flow.start(&ordering).await.expect("start");
            assert_eq!(session.required_modules, subset, "normalised to exam order");

            let mut visited = Vec::new();
            let mut finalize_steps = 0;
            while let Some(current) = session.current_module() {
                visited.push(current);
                let step = flow
                    .complete_current(&mut session, current, "test-1")
                    .await
                    .expect("complete");
                if step == FlowStep::Finalize {
                    finalize_steps += 1;
                }
            }

            assert_eq!(visited, subset);
            assert_eq!(finalize_steps, 1);
            assert!(flow.is_all_done(&session));
            assert_eq!(session.state, SessionState::AwaitingFinalize);

            let last = *subset.last().expect("non-empty subset");
            let repeat = flow
                .complete_current(&mut session, last, "test-1")
                .await
                .expect("repeat");
            assert_eq!(repeat, FlowStep::Noop);
        }
    }
}

#[tokio::test]
async fn abandoned_session_resumes_at_next_module() {
    let flow = controller();
    let mut session = flow
        .start(&[
            ModuleKind::Speaking,
            ModuleKind::Listening,
            ModuleKind::Writing,
            ModuleKind::Reading,
        ])
        .await
        .unwrap();

    flow.complete_current(&mut session, ModuleKind::Listening, "l-1")
        .await
        .unwrap();
    flow.complete_current(&mut session, ModuleKind::Reading, "r-1")
        .await
        .unwrap();
    assert!(!flow.is_all_done(&session));

    // reload from the store, as a fresh page would
    let mut reloaded = flow.get(session.id).await.unwrap();
    assert_eq!(reloaded.current_module(), Some(ModuleKind::Writing));
    assert!(flow.has_active_session(&reloaded));
    assert_eq!(reloaded.module_tests.get(&ModuleKind::Reading).map(String::as_str), Some("r-1"));

    flow.enter_module(&mut reloaded, ModuleKind::Writing)
        .await
        .expect("current module can be re-entered");
    let err = flow
        .enter_module(&mut reloaded, ModuleKind::Reading)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn completing_a_module_out_of_turn_is_rejected() {
    let flow = controller();
    let mut session = flow
        .start(&[ModuleKind::Listening, ModuleKind::Speaking])
        .await
        .unwrap();

    let err = flow
        .complete_current(&mut session, ModuleKind::Speaking, "s-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert!(session.completed_modules.is_empty());
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let flow = controller();
    let err = flow.get(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn session_needs_at_least_one_module() {
    let flow = controller();
    let err = flow.start(&[]).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn finalized_flag_is_set_once() {
    let flow = controller();
    let mut session = flow.start(&[ModuleKind::Reading]).await.unwrap();
    flow.complete_current(&mut session, ModuleKind::Reading, "r-1")
        .await
        .unwrap();

    assert!(flow.mark_finalized(&mut session).await.unwrap());
    assert!(!flow.mark_finalized(&mut session).await.unwrap());
    assert_eq!(session.state, SessionState::Finalized);
    assert!(!flow.has_active_session(&session));
}

#[derive(Default)]
struct RecordingHost {
    deny: AtomicBool,
    fullscreen_requests: AtomicUsize,
    fullscreen_exits: AtomicUsize,
    navigation_locked: AtomicBool,
    close_confirmation: AtomicBool,
}

#[async_trait]
impl IntegrityHost for RecordingHost {
    async fn request_fullscreen(&self) -> Result<(), HostDenied> {
        self.fullscreen_requests.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(HostDenied("fullscreen".to_string()));
        }
        Ok(())
    }

    async fn exit_fullscreen(&self) {
        self.fullscreen_exits.fetch_add(1, Ordering::SeqCst);
    }

    fn set_back_navigation_lock(&self, locked: bool) {
        self.navigation_locked.store(locked, Ordering::SeqCst);
    }

    fn set_close_confirmation(&self, enabled: bool) {
        self.close_confirmation.store(enabled, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn fullscreen_is_held_across_modules_and_released_after_finalize() {
    let host = Arc::new(RecordingHost::default());
    let flow = SessionFlowController::new(
        Arc::new(MemoryKeyValueStore::new()),
        IntegrityGuard::new(host.clone()),
    );

    let mut session = flow
        .start(&[ModuleKind::Listening, ModuleKind::Reading])
        .await
        .unwrap();
    assert!(host.navigation_locked.load(Ordering::SeqCst));
    assert!(host.close_confirmation.load(Ordering::SeqCst));

    flow.enter_module(&mut session, ModuleKind::Listening).await.unwrap();
    flow.complete_current(&mut session, ModuleKind::Listening, "l-1")
        .await
        .unwrap();
    flow.complete_current(&mut session, ModuleKind::Reading, "r-1")
        .await
        .unwrap();

    assert_eq!(host.fullscreen_requests.load(Ordering::SeqCst), 1);
    assert_eq!(host.fullscreen_exits.load(Ordering::SeqCst), 0);
    assert!(!host.navigation_locked.load(Ordering::SeqCst));

    flow.mark_finalized(&mut session).await.unwrap();
    assert_eq!(host.fullscreen_exits.load(Ordering::SeqCst), 1);
    assert!(!session.integrity.fullscreen_held);
}

struct UnavailableFinalizer;

#[async_trait]
impl SessionFinalizer for UnavailableFinalizer {
    async fn complete(&self, _session_id: Uuid) -> ExamResult<()> {
        Err(Error::Upstream {
            endpoint: "complete".to_string(),
            status: 503,
        })
    }
}

#[tokio::test]
async fn fullscreen_is_released_when_finalize_fails() {
    let host = Arc::new(RecordingHost::default());
    let store = Arc::new(MemoryKeyValueStore::new());
    let flow = SessionFlowController::new(store.clone(), IntegrityGuard::new(host.clone()));
    let coordinator = SubmissionCoordinator::new(
        AnswerStagingStore::new(store),
        flow.clone(),
        Arc::new(UnavailableFinalizer),
        RetryPolicy::once(),
    );

    let mut session = flow.start(&[ModuleKind::Speaking]).await.unwrap();
    flow.complete_current(&mut session, ModuleKind::Speaking, "s-1")
        .await
        .unwrap();
    assert!(session.integrity.fullscreen_held);

    let outcome = coordinator.finalize_session(&mut session).await.unwrap();
    assert!(matches!(outcome.finalize, FinalizeStatus::Failed { .. }));
    assert!(!session.already_completed);
    assert_eq!(host.fullscreen_exits.load(Ordering::SeqCst), 1);
    assert!(!session.integrity.fullscreen_held);

    let stored = flow.get(session.id).await.unwrap();
    assert!(!stored.integrity.fullscreen_held);
}

#[tokio::test]
async fn denied_fullscreen_does_not_block_the_flow() {
    let host = Arc::new(RecordingHost::default());
    host.deny.store(true, Ordering::SeqCst);
    let flow = SessionFlowController::new(
        Arc::new(MemoryKeyValueStore::new()),
        IntegrityGuard::new(host.clone()),
    );

    let mut session = flow.start(&[ModuleKind::Writing]).await.unwrap();
    assert!(session.integrity.armed);
    assert!(!session.integrity.fullscreen_held);
    assert!(host.navigation_locked.load(Ordering::SeqCst));

    let step = flow
        .complete_current(&mut session, ModuleKind::Writing, "w-1")
        .await
        .unwrap();
    assert_eq!(step, FlowStep::Finalize);
    assert_eq!(host.fullscreen_exits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn violations_are_counted_on_the_session() {
    let flow = controller();
    let mut session = flow.start(&[ModuleKind::Reading]).await.unwrap();

    flow.guard().report_violation(&mut session, "tab_hidden", None);
    let second = flow
        .guard()
        .report_violation(&mut session, "fullscreen_exit", Some("esc".into()));

    assert_eq!(second.count, 2);
    assert_eq!(second.module, Some(ModuleKind::Reading));
    assert_eq!(session.violations.len(), 2);
}
