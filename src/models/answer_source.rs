use serde::{Deserialize, Serialize};

/// Provenance of a candidate answer list, in descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Structured,
    Flat,
    Staged,
}

impl SourceKind {
    /// Higher wins when every other score component ties.
    pub fn priority(&self) -> u8 {
        match self {
            SourceKind::Structured => 3,
            SourceKind::Flat => 2,
            SourceKind::Staged => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateAnswer {
    pub question_id: Option<String>,
    pub question_text: Option<String>,
    pub answer: String,
    pub ordinal: Option<u32>,
    pub bucket_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSource {
    pub kind: SourceKind,
    pub answers: Vec<CandidateAnswer>,
}

impl AnswerSource {
    pub fn new(kind: SourceKind, answers: Vec<CandidateAnswer>) -> Self {
        Self { kind, answers }
    }
}

/// Reconciled answer for one question slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAnswer {
    pub question_id: Option<String>,
    pub question_text: String,
    pub answer: String,
    pub answered: bool,
    pub ordinal: u32,
    pub bucket: String,
    pub source: Option<SourceKind>,
    pub repaired: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSection {
    pub key: String,
    pub label: String,
    pub answers: Vec<CanonicalAnswer>,
}

impl CanonicalSection {
    pub fn is_answered(&self) -> bool {
        self.answers.iter().any(|a| a.answered)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledAnswers {
    pub chosen_source: Option<SourceKind>,
    pub sections: Vec<CanonicalSection>,
}

impl ReconciledAnswers {
    pub fn section(&self, key: &str) -> Option<&CanonicalSection> {
        self.sections.iter().find(|s| s.key == key)
    }

    pub fn answered_buckets(&self) -> Vec<String> {
        self.sections
            .iter()
            .filter(|s| s.is_answered())
            .map(|s| s.key.clone())
            .collect()
    }
}
