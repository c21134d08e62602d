use crate::error::{Error, Result};
use crate::models::module_kind::ModuleKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    InModule { module: ModuleKind },
    AwaitingFinalize,
    Finalized,
}

/// What the caller should do after a module completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "module", rename_all = "snake_case")]
pub enum FlowStep {
    Next(ModuleKind),
    Finalize,
    /// Duplicate trigger for a module that is already complete.
    Noop,
}

/// Session-scoped integrity resources. Full-screen outlives a single module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityState {
    pub armed: bool,
    pub fullscreen_held: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub kind: String,
    pub detail: Option<String>,
    pub module: Option<ModuleKind>,
    pub count: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: Uuid,
    pub required_modules: Vec<ModuleKind>,
    pub completed_modules: Vec<ModuleKind>,
    #[serde(default)]
    pub module_tests: BTreeMap<ModuleKind, String>,
    /// Modules whose staged answers the submission collaborator accepted.
    #[serde(default)]
    pub submitted_modules: Vec<ModuleKind>,
    pub state: SessionState,
    /// Set only after the finalize collaborator accepted the session.
    pub already_completed: bool,
    #[serde(default)]
    pub integrity: IntegrityState,
    #[serde(default)]
    pub violations: Vec<IntegrityViolation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExamSession {
    pub fn new(id: Uuid, modules: &[ModuleKind]) -> Result<Self> {
        let required_modules: Vec<ModuleKind> = ModuleKind::EXAM_ORDER
            .iter()
            .copied()
            .filter(|k| modules.contains(k))
            .collect();
        if required_modules.is_empty() {
            return Err(Error::BadRequest(
                "A session needs at least one module".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id,
            required_modules,
            completed_modules: Vec::new(),
            module_tests: BTreeMap::new(),
            submitted_modules: Vec::new(),
            state: SessionState::NotStarted,
            already_completed: false,
            integrity: IntegrityState::default(),
            violations: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn start(&mut self) -> Result<ModuleKind> {
        if self.state != SessionState::NotStarted {
            return Err(Error::Conflict(format!("Session {} already started", self.id)));
        }
        let first = self
            .next_pending()
            .ok_or_else(|| Error::Internal("Session has no modules".to_string()))?;
        self.state = SessionState::InModule { module: first };
        self.touch();
        Ok(first)
    }

    pub fn current_module(&self) -> Option<ModuleKind> {
        match self.state {
            SessionState::InModule { module } => Some(module),
            _ => None,
        }
    }

    pub fn is_completed(&self, module: ModuleKind) -> bool {
        self.completed_modules.contains(&module)
    }

    pub fn next_pending(&self) -> Option<ModuleKind> {
        self.required_modules
            .iter()
            .copied()
            .find(|m| !self.is_completed(*m))
    }

    /// Marks `module` done and advances. Completion is permanent.
    pub fn complete_module(&mut self, module: ModuleKind, test_id: &str) -> Result<FlowStep> {
        match self.state.clone() {
            SessionState::NotStarted => Err(Error::Conflict(format!(
                "Session {} has not started",
                self.id
            ))),
            SessionState::InModule { module: current } if current == module => {
                self.completed_modules.push(module);
                self.module_tests.insert(module, test_id.to_string());
                let step = match self.next_pending() {
                    Some(next) => {
                        self.state = SessionState::InModule { module: next };
                        FlowStep::Next(next)
                    }
                    None => {
                        self.state = SessionState::AwaitingFinalize;
                        FlowStep::Finalize
                    }
                };
                self.touch();
                Ok(step)
            }
            _ if self.is_completed(module) => Ok(FlowStep::Noop),
            _ => Err(Error::Conflict(format!(
                "Module {} is not the active module of session {}",
                module, self.id
            ))),
        }
    }

    /// A module may only be re-entered while its own attempt is the active one.
    pub fn ensure_current(&self, module: ModuleKind) -> Result<()> {
        match self.current_module() {
            Some(current) if current == module => Ok(()),
            _ => Err(Error::Conflict(format!(
                "Module {} cannot be entered in state {:?}",
                module, self.state
            ))),
        }
    }

    pub fn is_all_done(&self) -> bool {
        self.required_modules.iter().all(|m| self.is_completed(*m))
    }

    pub fn has_active_session(&self) -> bool {
        matches!(
            self.state,
            SessionState::InModule { .. } | SessionState::AwaitingFinalize
        )
    }

    /// Returns false when the session was already finalized.
    pub fn mark_finalized(&mut self) -> bool {
        if self.already_completed {
            return false;
        }
        self.already_completed = true;
        self.state = SessionState::Finalized;
        self.touch();
        true
    }

    pub fn record_violation(&mut self, kind: &str, detail: Option<String>) -> &IntegrityViolation {
        let count = self.violations.len() as u32 + 1;
        self.violations.push(IntegrityViolation {
            kind: kind.to_string(),
            detail,
            module: self.current_module(),
            count,
            occurred_at: Utc::now(),
        });
        self.touch();
        &self.violations[self.violations.len() - 1]
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
