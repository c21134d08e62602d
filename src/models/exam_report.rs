use crate::models::answer_source::{CanonicalAnswer, SourceKind};
use crate::models::feedback::FeedbackBundle;
use crate::models::module_kind::ModuleKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed-shape results view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamReport {
    pub session_id: Uuid,
    pub finalized: bool,
    /// False when the results collaborator could not be reached and only staged answers are shown.
    pub results_available: bool,
    pub modules: Vec<ModuleReport>,
}

impl ExamReport {
    pub fn module(&self, module: ModuleKind) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.module == module)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: ModuleKind,
    pub test_id: Option<String>,
    pub score: Option<f64>,
    pub answer_source: Option<SourceKind>,
    pub sections: Vec<ReportSection>,
    pub feedback: FeedbackBundle,
}

impl ModuleReport {
    pub fn section(&self, key: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.key == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub key: String,
    pub label: String,
    pub answers: Vec<CanonicalAnswer>,
    pub narrative: String,
}
