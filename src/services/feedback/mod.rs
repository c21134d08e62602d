//! Turns a grading payload of uncertain shape into a [`FeedbackBundle`].
//!
//! Accepted shapes: a plain narrative with `[LABEL]` section markers, an object with English or
//! Turkish key variants, or either of those serialised into a string (fenced or not, up to
//! three levels deep). Parse failures never surface; every field falls back to a placeholder.

pub mod extractors;
pub mod sanitize;
pub mod unwrap;

use crate::models::answer_source::ReconciledAnswers;
use crate::models::feedback::{
    BucketNarrative, Criterion, CriteriaFeedback, FeedbackBundle, GeneralFeedback, QuoteCorrection,
    NO_EVALUATION,
};
use crate::services::reconcile::layout::BucketLayout;
use crate::services::reconcile::normalize::is_meaningful_feedback;
use extractors::{
    extract_criterion, extract_score, lookup, text_of, PreparedFeedback, BUCKET_KEYS, GENERAL_KEYS,
    OVERALL_KEYS,
};
use sanitize::Sanitizer;
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone)]
pub struct FeedbackDecomposer {
    layout: BucketLayout,
}

impl FeedbackDecomposer {
    pub fn new(layout: BucketLayout) -> Self {
        Self { layout }
    }

    pub fn decompose(&self, raw: &JsonValue) -> FeedbackBundle {
        let prepared = PreparedFeedback::from_raw(raw);

        let (score, score_found) = match extract_score(&prepared) {
            Some(score) => (score, true),
            None => (0.0, false),
        };

        let mut criteria = CriteriaFeedback::default();
        for criterion in Criterion::ALL {
            *criteria.get_mut(criterion) = extract_criterion(&prepared, criterion);
        }

        let overall = prepared
            .find(OVERALL_KEYS)
            .and_then(text_of)
            .or_else(|| {
                (prepared.plain && is_meaningful_feedback(&prepared.preamble)).then(|| prepared.preamble.clone())
            })
            .unwrap_or_else(|| NO_EVALUATION.to_string());

        let bundle = FeedbackBundle {
            score,
            score_found,
            criteria,
            overall,
            narratives: self.narratives(&prepared),
            general: prepared.find(GENERAL_KEYS).and_then(general_feedback),
        };

        tracing::debug!(
            score = bundle.score,
            score_found = bundle.score_found,
            narratives = bundle.narratives.iter().filter(|n| n.text != NO_EVALUATION).count(),
            "Feedback decomposed"
        );
        bundle
    }

    /// Decomposes and then removes sentences that contradict `answers`.
    pub fn decompose_for(&self, raw: &JsonValue, answers: &ReconciledAnswers) -> FeedbackBundle {
        let bundle = self.decompose(raw);
        self.sanitize(bundle, answers)
    }

    pub fn sanitize(&self, mut bundle: FeedbackBundle, answers: &ReconciledAnswers) -> FeedbackBundle {
        let sanitizer = Sanitizer::new(&self.layout, &answers.answered_buckets());
        let clean = |text: &mut String| {
            let cleaned = sanitizer.clean(text);
            *text = if is_meaningful_feedback(&cleaned) {
                cleaned
            } else {
                NO_EVALUATION.to_string()
            };
        };

        for criterion in Criterion::ALL {
            clean(bundle.criteria.get_mut(criterion));
        }
        clean(&mut bundle.overall);
        for narrative in &mut bundle.narratives {
            clean(&mut narrative.text);
        }
        if let Some(general) = bundle.general.as_mut() {
            clean(&mut general.summary);
        }
        bundle
    }

    /// One narrative per bucket of the layout. Structured section entries win over
    /// `[LABEL]` blocks of the narrative.
    fn narratives(&self, prepared: &PreparedFeedback) -> Vec<BucketNarrative> {
        let mut texts: Vec<Vec<String>> = vec![Vec::new(); self.layout.buckets.len()];

        for (label, value) in prepared.named_entries(BUCKET_KEYS) {
            let Some(idx) = self.layout.bucket_for_label(&label) else { continue };
            if let Some(text) = text_of(&value) {
                texts[idx].push(text);
            }
        }

        let structured: Vec<bool> = texts.iter().map(|t| !t.is_empty()).collect();
        for block in &prepared.blocks {
            let Some(idx) = self.layout.bucket_for_label(&block.label) else { continue };
            if !structured[idx] && is_meaningful_feedback(&block.body) {
                texts[idx].push(block.body.clone());
            }
        }

        self.layout
            .buckets
            .iter()
            .zip(texts)
            .map(|(rule, parts)| BucketNarrative {
                bucket: rule.key.clone(),
                text: if parts.is_empty() {
                    NO_EVALUATION.to_string()
                } else {
                    parts.join("\n\n")
                },
            })
            .collect()
    }
}

fn strings_of(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::Array(items)) => items.iter().filter_map(text_of).collect(),
        Some(other) => text_of(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn corrections_of(value: Option<&JsonValue>) -> Vec<QuoteCorrection> {
    let Some(JsonValue::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(JsonValue::as_object)
        .filter_map(|item| {
            let quote = lookup(item, &["quote", "alinti", "original", "orijinal"]).and_then(text_of)?;
            let correction = lookup(item, &["correction", "duzeltme", "suggestion", "oneri"]).and_then(text_of)?;
            Some(QuoteCorrection { quote, correction })
        })
        .collect()
}

fn general_feedback(value: &JsonValue) -> Option<GeneralFeedback> {
    let map: Map<String, JsonValue> = match value {
        JsonValue::Object(map) => map.clone(),
        other => {
            let summary = text_of(other)?;
            return Some(GeneralFeedback {
                summary,
                recurring_gaps: Vec::new(),
                corrections: Vec::new(),
                exercises: Vec::new(),
                closing_note: NO_EVALUATION.to_string(),
            });
        }
    };

    let general = GeneralFeedback {
        summary: lookup(&map, &["summary", "ozet", "overview", "genel"])
            .and_then(text_of)
            .unwrap_or_else(|| NO_EVALUATION.to_string()),
        recurring_gaps: strings_of(lookup(
            &map,
            &["recurringgaps", "gaps", "weaknesses", "tekrarlayaneksikler", "eksikler", "zayifyonler"],
        )),
        corrections: corrections_of(lookup(&map, &["corrections", "duzeltmeler", "quotes", "alintilar"])),
        exercises: strings_of(lookup(&map, &["exercises", "practice", "alistirmalar", "oneriler"])),
        closing_note: lookup(&map, &["closingnote", "closing", "kapanis", "kapanisnotu", "sonnot"])
            .and_then(text_of)
            .unwrap_or_else(|| NO_EVALUATION.to_string()),
    };

    let empty = general.summary == NO_EVALUATION
        && general.recurring_gaps.is_empty()
        && general.corrections.is_empty()
        && general.exercises.is_empty()
        && general.closing_note == NO_EVALUATION;
    (!empty).then_some(general)
}
