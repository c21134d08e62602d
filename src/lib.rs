pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use crate::config::Config;
use crate::database::store::KeyValueStore;
use crate::error::Result;
use crate::services::{
    exam_api_service::ExamApiClient,
    exam_runner::ExamRunner,
    integrity_service::IntegrityGuard,
    reconcile::layout::LayoutRegistry,
    report_service::{ReportService, ResultsProvider},
    session_service::SessionFlowController,
    staging_service::AnswerStagingStore,
    submission_service::{ModuleSubmitter, RetryPolicy, SessionFinalizer, SubmissionCoordinator},
};
use std::sync::Arc;

/// External services the exam flow talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub submitter: Arc<dyn ModuleSubmitter>,
    pub finalizer: Arc<dyn SessionFinalizer>,
    pub results: Arc<dyn ResultsProvider>,
}

impl Collaborators {
    pub fn from_client(client: ExamApiClient) -> Self {
        let client = Arc::new(client);
        Self {
            submitter: client.clone(),
            finalizer: client.clone(),
            results: client,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ExamRunner>,
    pub reports: Arc<ReportService>,
    pub store_kind: &'static str,
}

impl AppState {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        store_kind: &'static str,
        collaborators: Collaborators,
        layouts: LayoutRegistry,
        retry: RetryPolicy,
    ) -> Self {
        let staging = AnswerStagingStore::new(store.clone());
        let flow = SessionFlowController::new(store, IntegrityGuard::noop());
        let coordinator = SubmissionCoordinator::new(
            staging.clone(),
            flow.clone(),
            collaborators.finalizer,
            retry,
        )
        .with_submitter_for_all(collaborators.submitter);

        let reports = ReportService::new(flow.clone(), staging.clone(), collaborators.results, layouts);
        let runner = ExamRunner::new(flow, staging, coordinator);

        Self {
            runner: Arc::new(runner),
            reports: Arc::new(reports),
            store_kind,
        }
    }

    pub fn from_config(store: Arc<dyn KeyValueStore>, store_kind: &'static str, config: &Config) -> Result<Self> {
        let client = ExamApiClient::new(config.exam_api_base_url.clone(), config.exam_api_token.clone())?;
        let layouts = match &config.bucket_layouts_file {
            Some(path) => LayoutRegistry::from_file(path)?,
            None => LayoutRegistry::new(),
        };
        let retry = RetryPolicy::new(config.submit_max_attempts, config.retry_backoff());
        Ok(Self::new(
            store,
            store_kind,
            Collaborators::from_client(client),
            layouts,
            retry,
        ))
    }
}
