use crate::models::module_kind::ModuleKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw answers of one module. Reading and listening submit a flat id → text map,
/// writing and speaking a section / sub-part / question tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    Sections(Vec<SectionAnswers>),
    Flat(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAnswers {
    pub section: String,
    #[serde(default)]
    pub parts: Vec<PartAnswers>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartAnswers {
    #[serde(default)]
    pub part: String,
    #[serde(default)]
    pub questions: Vec<LeafAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafAnswer {
    pub question_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub duration_seconds: u32,
}

/// A single answer flattened out of a payload, with its inferred position.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadLeaf {
    pub question_id: String,
    pub text: String,
    pub ordinal: u32,
    pub bucket_hint: Option<String>,
}

impl Default for AnswerPayload {
    fn default() -> Self {
        AnswerPayload::Flat(BTreeMap::new())
    }
}

impl AnswerPayload {
    pub fn leaves(&self) -> Vec<PayloadLeaf> {
        match self {
            AnswerPayload::Flat(map) => {
                let mut leaves: Vec<PayloadLeaf> = map
                    .iter()
                    .enumerate()
                    .map(|(idx, (id, text))| PayloadLeaf {
                        question_id: id.clone(),
                        text: text.clone(),
                        ordinal: ordinal_from_id(id).unwrap_or(idx as u32 + 1),
                        bucket_hint: None,
                    })
                    .collect();
                leaves.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then(a.question_id.cmp(&b.question_id)));
                leaves
            }
            AnswerPayload::Sections(sections) => {
                let mut leaves = Vec::new();
                for section in sections {
                    for part in &section.parts {
                        let hint = if part.part.trim().is_empty() {
                            section.section.clone()
                        } else {
                            part.part.clone()
                        };
                        for leaf in &part.questions {
                            leaves.push(PayloadLeaf {
                                question_id: leaf.question_id.clone(),
                                text: leaf.text.clone(),
                                ordinal: leaves.len() as u32 + 1,
                                bucket_hint: Some(hint.clone()),
                            });
                        }
                    }
                }
                leaves
            }
        }
    }

    /// Updates an existing answer or, for flat payloads, inserts it.
    pub fn set_answer(&mut self, question_id: &str, text: &str) -> bool {
        match self {
            AnswerPayload::Flat(map) => {
                map.insert(question_id.to_string(), text.to_string());
                true
            }
            AnswerPayload::Sections(sections) => sections
                .iter_mut()
                .flat_map(|s| s.parts.iter_mut())
                .flat_map(|p| p.questions.iter_mut())
                .find(|leaf| leaf.question_id == question_id)
                .map(|leaf| leaf.text = text.to_string())
                .is_some(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnswerPayload::Flat(map) => map.len(),
            AnswerPayload::Sections(sections) => sections
                .iter()
                .flat_map(|s| s.parts.iter())
                .map(|p| p.questions.len())
                .sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trailing digits of a question id ("q12" → 12).
pub fn ordinal_from_id(id: &str) -> Option<u32> {
    let digits: String = id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

/// Working state of one module while the candidate is inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleAttempt {
    pub module: ModuleKind,
    pub test_id: String,
    pub answers: AnswerPayload,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ModuleAttempt {
    pub fn new(module: ModuleKind, test_id: impl Into<String>, answers: AnswerPayload) -> Self {
        Self {
            module,
            test_id: test_id.into(),
            answers,
            started_at: Some(Utc::now()),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}
