use exam_session_backend::error::Error;
use exam_session_backend::models::answer_source::{AnswerSource, CandidateAnswer, SourceKind};
use exam_session_backend::models::feedback::NO_ANSWER;
use exam_session_backend::models::module_kind::ModuleKind;
use exam_session_backend::services::reconcile::layout::{BucketLayout, BucketRule, LayoutRegistry};
use exam_session_backend::services::reconcile::normalize::{
    fold_text, is_meaningful_feedback, is_placeholder, meaningful_len,
};
use exam_session_backend::services::reconcile::score::SourceScore;
use exam_session_backend::services::reconcile::AnswerReconciler;

fn answer(id: &str, ordinal: u32, text: &str) -> CandidateAnswer {
    CandidateAnswer {
        question_id: Some(id.to_string()),
        question_text: None,
        answer: text.to_string(),
        ordinal: Some(ordinal),
        bucket_hint: None,
    }
}

fn speaking() -> AnswerReconciler {
    AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Speaking))
}

/// Eight speaking answers: nothing staged, three in the flat list, seven in the structured result.
fn scenario_sources() -> Vec<AnswerSource> {
    let staged = AnswerSource::new(
        SourceKind::Staged,
        (1..=8).map(|n| answer(&format!("s{}", n), n, "No answer")).collect(),
    );
    let flat = AnswerSource::new(
        SourceKind::Flat,
        vec![
            answer("s1", 1, "I am a student."),
            answer("s5", 5, "My hometown is famous for its olive oil."),
            answer("s8", 8, "Cities should invest in public transport."),
        ],
    );
    let structured = AnswerSource::new(
        SourceKind::Structured,
        (1..=8)
            .map(|n| {
                let text = if n == 5 {
                    String::new()
                } else {
                    format!("Structured answer number {}", n)
                };
                CandidateAnswer {
                    question_text: Some(format!("Prompt {}", n)),
                    ..answer(&format!("s{}", n), n, &text)
                }
            })
            .collect(),
    );
    vec![staged, flat, structured]
}

#[test]
fn richest_source_is_chosen_and_gaps_are_repaired_by_id() {
    let result = speaking().reconcile(&scenario_sources());

    assert_eq!(result.chosen_source, Some(SourceKind::Structured));
    let keys: Vec<&str> = result.sections.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["part1_1", "part1_2", "part2", "part3"]);

    let part1_2 = result.section("part1_2").expect("part1_2");
    let repaired = part1_2
        .answers
        .iter()
        .find(|a| a.question_id.as_deref() == Some("s5"))
        .expect("s5 slot");
    assert!(repaired.repaired);
    assert!(repaired.answered);
    assert_eq!(repaired.answer, "My hometown is famous for its olive oil.");
    assert_eq!(repaired.question_text, "Prompt 5");

    // slots that already had a meaningful answer are untouched
    let first = &result.section("part1_1").unwrap().answers[0];
    assert_eq!(first.answer, "Structured answer number 1");
    assert!(!first.repaired);

    assert_eq!(result.answered_buckets().len(), 4);
}

#[test]
fn reconciliation_is_identical_for_every_source_order() {
    let sources = scenario_sources();
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let reconciler = speaking();
    let expected = serde_json::to_string(&reconciler.reconcile(&sources)).unwrap();
    for order in orders {
        let permuted: Vec<AnswerSource> = order.iter().map(|&i| sources[i].clone()).collect();
        let actual = serde_json::to_string(&reconciler.reconcile(&permuted)).unwrap();
        assert_eq!(actual, expected, "order {:?}", order);
    }
}

#[test]
fn meaningful_answers_are_never_downgraded_or_replaced() {
    let structured = AnswerSource::new(
        SourceKind::Structured,
        vec![answer("w1", 1, "Short."), answer("w2", 2, "Second task essay.")],
    );
    let staged = AnswerSource::new(
        SourceKind::Staged,
        vec![answer("w1", 1, "A much longer and more complete letter to the manager.")],
    );

    let result = AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Writing))
        .reconcile(&[staged, structured]);

    assert_eq!(result.chosen_source, Some(SourceKind::Structured));
    let task1 = &result.section("task1").unwrap().answers[0];
    assert_eq!(task1.answer, "Short.");
    assert!(!task1.repaired);
}

#[test]
fn placeholders_are_detected_regardless_of_case_and_diacritics() {
    for text in ["Yanıt Yok", "yanit yok.", "YANIT YOK", "  ", "N/A", "Cevap verilmedi!", "No transcript available"] {
        assert!(is_placeholder(text), "{:?} should be a placeholder", text);
        assert_eq!(meaningful_len(text), 0);
    }
    assert!(!is_placeholder("Yok artık, çok güzeldi"));
    assert_eq!(fold_text("Şehir  MERKEZİ, güzel!"), "sehir merkezi guzel");
}

#[test]
fn placeholder_answers_render_as_no_answer() {
    let source = AnswerSource::new(
        SourceKind::Flat,
        vec![answer("q1", 1, "Yanıt Yok"), answer("q2", 2, " B ")],
    );
    let result = AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Reading)).reconcile(&[source]);

    let answers = &result.section("answers").unwrap().answers;
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].answer, NO_ANSWER);
    assert!(!answers[0].answered);
    assert_eq!(answers[1].answer, "B");
    assert_eq!(answers[1].question_text, "Question 2");
}

#[test]
fn short_choice_answers_are_real_answers() {
    let structured = AnswerSource::new(
        SourceKind::Structured,
        vec![answer("r1", 1, "NOT GIVEN"), answer("r2", 2, "None"), answer("r3", 3, "TRUE")],
    );
    let staged = AnswerSource::new(
        SourceKind::Staged,
        vec![answer("r1", 1, "A considerably longer answer from another source")],
    );
    let result = AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Reading))
        .reconcile(&[staged, structured]);

    assert_eq!(result.chosen_source, Some(SourceKind::Structured));
    let rendered: Vec<(&str, bool, bool)> = result
        .section("answers")
        .unwrap()
        .answers
        .iter()
        .map(|a| (a.answer.as_str(), a.answered, a.repaired))
        .collect();
    assert_eq!(
        rendered,
        vec![("NOT GIVEN", true, false), ("None", true, false), ("TRUE", true, false)]
    );

    for text in ["NOT GIVEN", "None", "Yok", "boş"] {
        assert!(!is_placeholder(text), "{:?} is an answer", text);
        assert!(!is_meaningful_feedback(text), "{:?} is not feedback", text);
    }
}

#[test]
fn duplicate_ids_keep_the_later_answer_unless_it_is_shorter() {
    let source = AnswerSource::new(
        SourceKind::Flat,
        vec![
            answer("q1", 1, "first"),
            answer("q1", 1, "later"),
            answer("q2", 2, "complete answer"),
            answer("q2", 2, "cut"),
        ],
    );
    let result = AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Listening)).reconcile(&[source]);

    let answers = &result.section("answers").unwrap().answers;
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].answer, "later");
    assert_eq!(answers[1].answer, "complete answer");
}

#[test]
fn no_answers_anywhere_yields_placeholder_slots() {
    let empty = AnswerSource::new(SourceKind::Structured, Vec::new());
    let result = speaking().reconcile(&[empty]);

    assert_eq!(result.chosen_source, None);
    let counts: Vec<usize> = result.sections.iter().map(|s| s.answers.len()).collect();
    assert_eq!(counts, vec![3, 3, 1, 1]);
    assert!(result
        .sections
        .iter()
        .flat_map(|s| &s.answers)
        .all(|a| a.answer == NO_ANSWER && !a.answered));
    assert_eq!(result.sections[1].answers[0].question_text, "Question 4");
    assert!(result.answered_buckets().is_empty());
}

#[test]
fn bucket_hints_take_precedence_over_ordinals() {
    let source = AnswerSource::new(
        SourceKind::Structured,
        vec![
            CandidateAnswer {
                bucket_hint: Some("Bölüm 1.2".into()),
                ..answer("a", 1, "hinted into the second group")
            },
            answer("b", 7, "long turn"),
            answer("c", 20, "discussion"),
        ],
    );
    let result = speaking().reconcile(&[source]);

    let placed = |key: &str, id: &str| {
        result
            .section(key)
            .unwrap()
            .answers
            .iter()
            .any(|a| a.question_id.as_deref() == Some(id))
    };
    assert!(placed("part1_2", "a"));
    assert!(placed("part2", "b"));
    assert!(placed("part3", "c"));
}

#[test]
fn source_score_orders_meaningful_then_coverage_then_priority() {
    let score = |meaningful, coverage, total, kind| SourceScore {
        meaningful,
        coverage,
        total,
        kind,
    };

    assert!(score(7, 1, 8, SourceKind::Staged) > score(3, 4, 3, SourceKind::Structured));
    assert!(score(3, 3, 8, SourceKind::Staged) > score(3, 2, 3, SourceKind::Structured));
    // same counts, denser source wins
    assert!(score(3, 2, 3, SourceKind::Staged) > score(3, 2, 6, SourceKind::Structured));
    // full tie falls back to the fixed priority
    assert!(score(3, 2, 4, SourceKind::Structured) > score(3, 2, 4, SourceKind::Flat));
    assert!(score(3, 2, 4, SourceKind::Flat) > score(3, 2, 4, SourceKind::Staged));
    assert_eq!(score(0, 0, 0, SourceKind::Flat).ratio(), 0.0);
}

#[test]
fn layout_labels_resolve_across_languages_and_granularity() {
    let speaking = BucketLayout::default_for(ModuleKind::Speaking);
    assert_eq!(speaking.bucket_for_label("Kısım 1.1"), Some(0));
    assert_eq!(speaking.bucket_for_label("PART 2 - long turn"), Some(2));
    assert_eq!(speaking.buckets_matching("part 1"), vec![0, 1]);
    assert_eq!(speaking.bucket_for_ordinal(5), 1);
    assert_eq!(speaking.bucket_for_ordinal(42), 3);

    let writing = BucketLayout::default_for(ModuleKind::Writing);
    assert_eq!(writing.assign(Some("Görev 2"), 1), 1);
    assert_eq!(writing.assign(Some("unrelated"), 1), 0);
}

#[test]
fn registry_prefers_test_specific_layouts() {
    let custom = BucketLayout {
        buckets: vec![BucketRule {
            key: "interview".into(),
            label: "Interview".into(),
            first_ordinal: 1,
            last_ordinal: None,
            expected_slots: 2,
            hints: vec![],
        }],
    };
    let registry = LayoutRegistry::new().with_override("speaking:mock-7", custom.clone());

    assert_eq!(registry.layout_for(ModuleKind::Speaking, Some("mock-7")), custom);
    assert_eq!(
        registry.layout_for(ModuleKind::Speaking, Some("mock-8")),
        BucketLayout::default_for(ModuleKind::Speaking)
    );
}

#[test]
fn registry_loads_overrides_and_rejects_empty_layouts() {
    let dir = std::env::temp_dir();
    let valid = dir.join(format!("layouts-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(
        &valid,
        r#"{ "writing": { "buckets": [ { "key": "essay", "label": "Essay", "first_ordinal": 1 } ] } }"#,
    )
    .unwrap();
    let registry = LayoutRegistry::from_file(&valid).unwrap();
    let layout = registry.layout_for(ModuleKind::Writing, Some("any"));
    assert_eq!(layout.buckets.len(), 1);
    assert_eq!(layout.buckets[0].key, "essay");
    std::fs::remove_file(&valid).ok();

    let empty = dir.join(format!("layouts-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&empty, r#"{ "speaking": { "buckets": [] } }"#).unwrap();
    let err = LayoutRegistry::from_file(&empty).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    std::fs::remove_file(&empty).ok();
}
