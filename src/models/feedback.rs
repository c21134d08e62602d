use serde::{Deserialize, Serialize};

pub const NO_ANSWER: &str = "No answer";
pub const NO_EVALUATION: &str = "No evaluation available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Coherence,
    Grammar,
    Lexical,
    TaskAchievement,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Coherence,
        Criterion::Grammar,
        Criterion::Lexical,
        Criterion::TaskAchievement,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaFeedback {
    pub coherence: String,
    pub grammar: String,
    pub lexical: String,
    pub task_achievement: String,
}

impl Default for CriteriaFeedback {
    fn default() -> Self {
        Self {
            coherence: NO_EVALUATION.to_string(),
            grammar: NO_EVALUATION.to_string(),
            lexical: NO_EVALUATION.to_string(),
            task_achievement: NO_EVALUATION.to_string(),
        }
    }
}

impl CriteriaFeedback {
    pub fn get(&self, criterion: Criterion) -> &str {
        match criterion {
            Criterion::Coherence => &self.coherence,
            Criterion::Grammar => &self.grammar,
            Criterion::Lexical => &self.lexical,
            Criterion::TaskAchievement => &self.task_achievement,
        }
    }

    pub fn get_mut(&mut self, criterion: Criterion) -> &mut String {
        match criterion {
            Criterion::Coherence => &mut self.coherence,
            Criterion::Grammar => &mut self.grammar,
            Criterion::Lexical => &mut self.lexical,
            Criterion::TaskAchievement => &mut self.task_achievement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketNarrative {
    pub bucket: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteCorrection {
    pub quote: String,
    pub correction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralFeedback {
    pub summary: String,
    pub recurring_gaps: Vec<String>,
    pub corrections: Vec<QuoteCorrection>,
    pub exercises: Vec<String>,
    pub closing_note: String,
}

/// Normalised feedback. Every text field holds a value or an explicit placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackBundle {
    pub score: f64,
    pub score_found: bool,
    pub criteria: CriteriaFeedback,
    pub overall: String,
    pub narratives: Vec<BucketNarrative>,
    pub general: Option<GeneralFeedback>,
}

impl FeedbackBundle {
    pub fn narrative(&self, bucket: &str) -> &str {
        self.narratives
            .iter()
            .find(|n| n.bucket == bucket)
            .map(|n| n.text.as_str())
            .unwrap_or(NO_EVALUATION)
    }
}
