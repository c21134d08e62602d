use crate::error::Result;
use crate::models::answer_source::{AnswerSource, CandidateAnswer, SourceKind};
use crate::models::exam_report::{ExamReport, ModuleReport, ReportSection};
use crate::models::exam_result::{ExamResult, ModuleResult};
use crate::models::exam_session::ExamSession;
use crate::models::module_kind::ModuleKind;
use crate::models::staged_answer::StagedAnswerRecord;
use crate::services::feedback::FeedbackDecomposer;
use crate::services::reconcile::layout::LayoutRegistry;
use crate::services::reconcile::AnswerReconciler;
use crate::services::session_service::SessionFlowController;
use crate::services::staging_service::AnswerStagingStore;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// Authoritative scores, answers and feedback for a session.
#[async_trait]
pub trait ResultsProvider: Send + Sync {
    async fn fetch_results(&self, session_id: Uuid) -> Result<ExamResult>;
}

#[derive(Clone)]
pub struct ReportService {
    flow: SessionFlowController,
    staging: AnswerStagingStore,
    results: Arc<dyn ResultsProvider>,
    layouts: LayoutRegistry,
}

impl ReportService {
    pub fn new(
        flow: SessionFlowController,
        staging: AnswerStagingStore,
        results: Arc<dyn ResultsProvider>,
        layouts: LayoutRegistry,
    ) -> Self {
        Self {
            flow,
            staging,
            results,
            layouts,
        }
    }

    /// Builds the report from whatever is reachable. A failing results call or staging read
    /// degrades the report instead of failing it; only an unknown session is an error.
    pub async fn build_report(&self, session_id: Uuid) -> Result<ExamReport> {
        let session = self.flow.get(session_id).await?;

        let (result, results_available) = match self.results.fetch_results(session_id).await {
            Ok(result) => (result, true),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Results unavailable, showing staged answers");
                (ExamResult::default(), false)
            }
        };
        let staged = self.staging.drain_all(session_id).await.unwrap_or_else(|e| {
            tracing::warn!(session_id = %session_id, error = %e, "Staged answers unavailable");
            Vec::new()
        });

        let modules = report_modules(&session, &result)
            .into_iter()
            .map(|module| {
                let module_result = result.modules.iter().find(|m| m.module == module);
                let test_id = module_result
                    .and_then(|m| m.test_id.clone())
                    .or_else(|| session.module_tests.get(&module).cloned());
                let record = pick_staged(&staged, module, test_id.as_deref());
                self.module_report(module, test_id.or_else(|| record.map(|r| r.test_id.clone())), module_result, record)
            })
            .collect();

        Ok(ExamReport {
            session_id,
            finalized: session.already_completed,
            results_available,
            modules,
        })
    }

    fn module_report(
        &self,
        module: ModuleKind,
        test_id: Option<String>,
        result: Option<&ModuleResult>,
        staged: Option<&StagedAnswerRecord>,
    ) -> ModuleReport {
        let layout = self.layouts.layout_for(module, test_id.as_deref());

        let mut sources = Vec::with_capacity(3);
        if let Some(result) = result {
            sources.push(structured_source(result));
            sources.push(flat_source(result));
        }
        if let Some(record) = staged {
            sources.push(staged_source(record));
        }

        let answers = AnswerReconciler::new(layout.clone()).reconcile(&sources);
        let raw_feedback = result.map(|r| r.feedback.clone()).unwrap_or(JsonValue::Null);
        let feedback = FeedbackDecomposer::new(layout).decompose_for(&raw_feedback, &answers);

        let score = result
            .and_then(|r| r.score)
            .or_else(|| feedback.score_found.then_some(feedback.score));

        let sections = answers
            .sections
            .iter()
            .map(|section| ReportSection {
                key: section.key.clone(),
                label: section.label.clone(),
                answers: section.answers.clone(),
                narrative: feedback.narrative(&section.key).to_string(),
            })
            .collect();

        ModuleReport {
            module,
            test_id,
            score,
            answer_source: answers.chosen_source,
            sections,
            feedback,
        }
    }
}

/// Required modules in exam order, plus any module the results mention that the session
/// did not list.
fn report_modules(session: &ExamSession, result: &ExamResult) -> Vec<ModuleKind> {
    let mut modules = session.required_modules.clone();
    for extra in result.modules.iter().map(|m| m.module) {
        if !modules.contains(&extra) {
            modules.push(extra);
        }
    }
    modules.sort_by_key(|m| m.exam_position());
    modules
}

fn pick_staged<'a>(
    staged: &'a [StagedAnswerRecord],
    module: ModuleKind,
    test_id: Option<&str>,
) -> Option<&'a StagedAnswerRecord> {
    let candidates = staged.iter().filter(|r| r.module == module);
    match test_id {
        Some(test_id) => staged
            .iter()
            .find(|r| r.module == module && r.test_id == test_id)
            .or_else(|| candidates.max_by_key(|r| r.staged_at)),
        None => candidates.max_by_key(|r| r.staged_at),
    }
}

fn structured_source(result: &ModuleResult) -> AnswerSource {
    let answers = result
        .sections
        .iter()
        .flat_map(|section| {
            section.questions.iter().map(move |q| CandidateAnswer {
                question_id: q.id.clone(),
                question_text: q.text.clone(),
                answer: q.answer.clone().map(|a| a.into_text()).unwrap_or_default(),
                ordinal: q.ordinal,
                bucket_hint: section.key.clone(),
            })
        })
        .collect();
    AnswerSource::new(SourceKind::Structured, answers)
}

fn flat_source(result: &ModuleResult) -> AnswerSource {
    let answers = result
        .legacy_answers
        .iter()
        .map(|a| CandidateAnswer {
            question_id: a.question_id.clone(),
            question_text: a.question_text.clone(),
            answer: a.answer.clone().map(|t| t.into_text()).unwrap_or_default(),
            ordinal: a.ordinal,
            bucket_hint: a.section.clone(),
        })
        .collect();
    AnswerSource::new(SourceKind::Flat, answers)
}

fn staged_source(record: &StagedAnswerRecord) -> AnswerSource {
    let answers = record
        .answers
        .leaves()
        .into_iter()
        .map(|leaf| CandidateAnswer {
            question_id: Some(leaf.question_id),
            question_text: None,
            answer: leaf.text,
            ordinal: Some(leaf.ordinal),
            bucket_hint: leaf.bucket_hint,
        })
        .collect();
    AnswerSource::new(SourceKind::Staged, answers)
}
