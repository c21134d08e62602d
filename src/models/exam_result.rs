use crate::models::module_kind::ModuleKind;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Authoritative result returned by the results collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamResult {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub modules: Vec<ModuleResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleResult {
    pub module: ModuleKind,
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    /// Canonical test definition with nested answers.
    #[serde(default)]
    pub sections: Vec<StructuredSection>,
    /// Legacy denormalised answer list.
    #[serde(default, alias = "answers")]
    pub legacy_answers: Vec<LegacyAnswer>,
    #[serde(default)]
    pub feedback: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredSection {
    #[serde(default, alias = "label", alias = "title")]
    pub key: Option<String>,
    #[serde(default)]
    pub questions: Vec<StructuredQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredQuestion {
    #[serde(default, deserialize_with = "flexible_id")]
    pub id: Option<String>,
    #[serde(default, alias = "question")]
    pub text: Option<String>,
    #[serde(default, alias = "order")]
    pub ordinal: Option<u32>,
    #[serde(default)]
    pub answer: Option<AnswerText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyAnswer {
    #[serde(default, deserialize_with = "flexible_id")]
    pub question_id: Option<String>,
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default)]
    pub answer: Option<AnswerText>,
    #[serde(default, alias = "order")]
    pub ordinal: Option<u32>,
    #[serde(default, alias = "part")]
    pub section: Option<String>,
}

/// Answer text as sent upstream: either a bare string or `{ "text": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerText {
    Plain(String),
    Wrapped {
        #[serde(alias = "transcript", alias = "answer")]
        text: Option<String>,
    },
}

impl AnswerText {
    pub fn into_text(self) -> String {
        match self {
            AnswerText::Plain(s) => s,
            AnswerText::Wrapped { text } => text.unwrap_or_default(),
        }
    }
}

/// Upstream ids arrive as strings or numbers.
fn flexible_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match raw {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
