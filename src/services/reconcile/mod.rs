//! Merges answer records from the structured result, the legacy flat list and the
//! staged snapshots into one canonical set of answers per section.
//!
//! 1. every source is de-duplicated and bucketed on its own (label hint, then ordinal range);
//! 2. each source is scored and the greatest [`SourceScore`] is chosen;
//! 3. empty slots of the chosen source are repaired from the best text any source has for the
//!    same question id. Slots that already hold a meaningful answer are never replaced.

pub mod layout;
pub mod normalize;
pub mod score;

use crate::models::answer_source::{
    AnswerSource, CandidateAnswer, CanonicalAnswer, CanonicalSection, ReconciledAnswers, SourceKind,
};
use crate::models::feedback::NO_ANSWER;
use layout::BucketLayout;
use normalize::{is_meaningful, meaningful_len};
use score::SourceScore;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
struct Slot {
    question_id: Option<String>,
    question_text: Option<String>,
    answer: String,
    ordinal: u32,
    bucket: usize,
    repaired: bool,
}

#[derive(Debug, Clone)]
struct PreparedSource {
    kind: SourceKind,
    slots: Vec<Slot>,
    score: SourceScore,
}

#[derive(Debug, Clone)]
pub struct AnswerReconciler {
    layout: BucketLayout,
}

impl AnswerReconciler {
    pub fn new(layout: BucketLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    /// Deterministic for any permutation of `sources` with distinct kinds.
    pub fn reconcile(&self, sources: &[AnswerSource]) -> ReconciledAnswers {
        let mut prepared: Vec<PreparedSource> = sources.iter().map(|s| self.prepare(s)).collect();
        prepared.sort_by(|a, b| b.kind.priority().cmp(&a.kind.priority()));

        let chosen = prepared
            .iter()
            .filter(|p| p.score.total > 0)
            .max_by(|a, b| a.score.cmp(&b.score))
            .cloned();

        let Some(mut chosen) = chosen else {
            return ReconciledAnswers {
                chosen_source: None,
                sections: self.build_sections(Vec::new(), None),
            };
        };

        tracing::debug!(
            source = ?chosen.kind,
            meaningful = chosen.score.meaningful,
            coverage = chosen.score.coverage,
            ratio = chosen.score.ratio(),
            "Answer source selected"
        );

        self.repair_gaps(&mut chosen, &prepared);
        let kind = chosen.kind;
        ReconciledAnswers {
            chosen_source: Some(kind),
            sections: self.build_sections(chosen.slots, Some(kind)),
        }
    }

    /// Orders, de-duplicates and buckets one source, then scores it.
    fn prepare(&self, source: &AnswerSource) -> PreparedSource {
        let mut keys: Vec<String> = Vec::new();
        let mut by_key: HashMap<String, (Slot, Option<String>)> = HashMap::new();

        for (idx, candidate) in source.answers.iter().enumerate() {
            let ordinal = candidate.ordinal.unwrap_or(idx as u32 + 1);
            let question_id = candidate
                .question_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            let key = match &question_id {
                Some(id) => format!("id:{}", id),
                None => format!("ord:{}", ordinal),
            };
            let slot = slot_from(candidate, question_id, ordinal);

            match by_key.get_mut(&key) {
                // later occurrence wins unless it is strictly shorter
                Some((existing, hint)) => {
                    if meaningful_len(&slot.answer) >= meaningful_len(&existing.answer) {
                        let text = slot.question_text.clone().or_else(|| existing.question_text.take());
                        *existing = Slot { question_text: text, ..slot };
                        if candidate.bucket_hint.is_some() {
                            *hint = candidate.bucket_hint.clone();
                        }
                    }
                }
                None => {
                    keys.push(key.clone());
                    by_key.insert(key, (slot, candidate.bucket_hint.clone()));
                }
            }
        }

        let slots: Vec<Slot> = keys
            .into_iter()
            .filter_map(|key| by_key.remove(&key))
            .map(|(mut slot, hint)| {
                slot.bucket = self.layout.assign(hint.as_deref(), slot.ordinal);
                slot
            })
            .collect();

        let meaningful = slots.iter().filter(|s| is_meaningful(&s.answer)).count();
        let coverage = slots
            .iter()
            .filter(|s| is_meaningful(&s.answer))
            .map(|s| s.bucket)
            .collect::<BTreeSet<_>>()
            .len();

        PreparedSource {
            kind: source.kind,
            score: SourceScore {
                meaningful,
                coverage,
                total: slots.len(),
                kind: source.kind,
            },
            slots,
        }
    }

    fn repair_gaps(&self, chosen: &mut PreparedSource, all: &[PreparedSource]) {
        // question id -> (best text, priority of the source it came from)
        let mut best: HashMap<&str, (&str, u8)> = HashMap::new();
        let mut texts: HashMap<&str, (&str, u8)> = HashMap::new();

        for source in all {
            let priority = source.kind.priority();
            for slot in &source.slots {
                let Some(id) = slot.question_id.as_deref() else { continue };

                if let Some(text) = slot.question_text.as_deref().filter(|t| !t.trim().is_empty()) {
                    let entry = texts.entry(id).or_insert((text, priority));
                    if priority > entry.1 {
                        *entry = (text, priority);
                    }
                }

                if !is_meaningful(&slot.answer) {
                    continue;
                }
                let candidate = (slot.answer.as_str(), priority);
                match best.get(id) {
                    Some(current) if !better_text(candidate, *current) => {}
                    _ => {
                        best.insert(id, candidate);
                    }
                }
            }
        }

        for slot in &mut chosen.slots {
            let Some(id) = slot.question_id.clone() else { continue };
            if slot.question_text.is_none() {
                slot.question_text = texts.get(id.as_str()).map(|(t, _)| t.to_string());
            }
            if is_meaningful(&slot.answer) {
                continue;
            }
            if let Some((text, _)) = best.get(id.as_str()) {
                slot.answer = text.to_string();
                slot.repaired = true;
            }
        }
    }

    fn build_sections(&self, slots: Vec<Slot>, source: Option<SourceKind>) -> Vec<CanonicalSection> {
        let mut sections: Vec<CanonicalSection> = self
            .layout
            .buckets
            .iter()
            .map(|rule| CanonicalSection {
                key: rule.key.clone(),
                label: rule.label.clone(),
                answers: Vec::new(),
            })
            .collect();

        for slot in slots {
            let Some(section) = sections.get_mut(slot.bucket) else { continue };
            let answered = is_meaningful(&slot.answer);
            section.answers.push(CanonicalAnswer {
                question_text: slot
                    .question_text
                    .unwrap_or_else(|| format!("Question {}", slot.ordinal)),
                question_id: slot.question_id,
                answer: if answered {
                    slot.answer.trim().to_string()
                } else {
                    NO_ANSWER.to_string()
                },
                answered,
                ordinal: slot.ordinal,
                bucket: section.key.clone(),
                source,
                repaired: slot.repaired,
            });
        }

        for (section, rule) in sections.iter_mut().zip(&self.layout.buckets) {
            let mut next_ordinal = rule.first_ordinal;
            while section.answers.len() < rule.expected_slots {
                while section.answers.iter().any(|a| a.ordinal == next_ordinal) {
                    next_ordinal += 1;
                }
                section.answers.push(CanonicalAnswer {
                    question_id: None,
                    question_text: format!("Question {}", next_ordinal),
                    answer: NO_ANSWER.to_string(),
                    answered: false,
                    ordinal: next_ordinal,
                    bucket: rule.key.clone(),
                    source: None,
                    repaired: false,
                });
            }
            section
                .answers
                .sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.question_id.cmp(&b.question_id)));
        }

        sections
    }
}

fn slot_from(candidate: &CandidateAnswer, question_id: Option<String>, ordinal: u32) -> Slot {
    Slot {
        question_id,
        question_text: candidate
            .question_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        answer: candidate.answer.clone(),
        ordinal,
        bucket: 0,
        repaired: false,
    }
}

/// Longer meaningful text wins, then source priority, then the smaller string.
fn better_text(candidate: (&str, u8), current: (&str, u8)) -> bool {
    let (cand_len, cur_len) = (meaningful_len(candidate.0), meaningful_len(current.0));
    cand_len > cur_len
        || (cand_len == cur_len
            && (candidate.1 > current.1 || (candidate.1 == current.1 && candidate.0 < current.0)))
}
