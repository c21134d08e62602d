use exam_session_backend::models::answer_source::{AnswerSource, CandidateAnswer, SourceKind};
use exam_session_backend::models::feedback::NO_EVALUATION;
use exam_session_backend::models::module_kind::ModuleKind;
use exam_session_backend::services::feedback::extractors::{split_markers, MarkedBlock};
use exam_session_backend::services::feedback::unwrap::{parse_embedded, unwrap_payload};
use exam_session_backend::services::feedback::FeedbackDecomposer;
use exam_session_backend::services::reconcile::layout::BucketLayout;
use exam_session_backend::services::reconcile::AnswerReconciler;
use serde_json::{json, Value as JsonValue};

fn decomposer(module: ModuleKind) -> FeedbackDecomposer {
    FeedbackDecomposer::new(BucketLayout::default_for(module))
}

#[test]
fn plain_narrative_with_section_markers() {
    let text = "Confident speaker overall. Band score: 6.5\n\
                Fluency and coherence: Speaks at length without effort.\n\
                Grammar: Mostly accurate with minor slips.\n\
                [Part 1.1] Clear and relevant answers.\n\
                [Part 2] The long turn was well organised.";

    let bundle = decomposer(ModuleKind::Speaking).decompose(&JsonValue::String(text.to_string()));

    assert!(bundle.score_found);
    assert_eq!(bundle.score, 6.5);
    assert_eq!(bundle.criteria.coherence, "Speaks at length without effort.");
    assert_eq!(bundle.criteria.grammar, "Mostly accurate with minor slips.");
    assert_eq!(bundle.criteria.lexical, NO_EVALUATION);
    assert_eq!(bundle.criteria.task_achievement, NO_EVALUATION);
    assert!(bundle.overall.starts_with("Confident speaker overall."));

    assert_eq!(bundle.narrative("part1_1"), "Clear and relevant answers.");
    assert_eq!(bundle.narrative("part1_2"), NO_EVALUATION);
    assert_eq!(bundle.narrative("part2"), "The long turn was well organised.");
    assert_eq!(bundle.narrative("part3"), NO_EVALUATION);
    assert!(bundle.general.is_none());
}

#[test]
fn turkish_keys_are_recognised() {
    let raw = json!({
        "puan": "7,5",
        "kriterler": {
            "Tutarlılık": "Paragraflar mantıklı bağlanmış.",
            "Dil Bilgisi": "Zaman uyumu hataları var.",
            "Kelime Dağarcığı": "Zengin kelime kullanımı.",
            "Görev Başarısı": "Tüm maddeler ele alınmış."
        },
        "genel_yorum": "İyi bir deneme.",
        "bölümler": {
            "Görev 1": "Mektup uygun tonda.",
            "Görev 2": "Tez açık."
        }
    });

    let bundle = decomposer(ModuleKind::Writing).decompose(&raw);

    assert_eq!(bundle.score, 7.5);
    assert_eq!(bundle.criteria.coherence, "Paragraflar mantıklı bağlanmış.");
    assert_eq!(bundle.criteria.grammar, "Zaman uyumu hataları var.");
    assert_eq!(bundle.criteria.lexical, "Zengin kelime kullanımı.");
    assert_eq!(bundle.criteria.task_achievement, "Tüm maddeler ele alınmış.");
    assert_eq!(bundle.overall, "İyi bir deneme.");
    assert_eq!(bundle.narrative("task1"), "Mektup uygun tonda.");
    assert_eq!(bundle.narrative("task2"), "Tez açık.");
}

#[test]
fn double_wrapped_fenced_json_is_unwrapped() {
    let inner = json!({
        "overall_score": 6,
        "overall_feedback": "Solid work.",
        "feedback": {
            "grammar": "Good control of complex forms.",
            "lexical_resource": "Adequate range."
        }
    });
    let fenced = format!("```json\n{}\n```", serde_json::to_string_pretty(&inner).unwrap());
    let twice = serde_json::to_string(&JsonValue::String(fenced)).unwrap();

    let bundle = decomposer(ModuleKind::Writing).decompose(&JsonValue::String(twice));

    assert!(bundle.score_found);
    assert_eq!(bundle.score, 6.0);
    assert_eq!(bundle.overall, "Solid work.");
    assert_eq!(bundle.criteria.grammar, "Good control of complex forms.");
    assert_eq!(bundle.criteria.lexical, "Adequate range.");
    assert_eq!(bundle.criteria.coherence, NO_EVALUATION);
}

#[test]
fn criteria_fall_through_the_extraction_pipeline() {
    let raw = json!({
        "coherence": "Ideas flow logically.",
        "analysis": [
            { "criterion": "Lexical Resource", "comment": "Wide range of idioms." }
        ],
        "notes": "[Grammar] Accurate tense use.\nTask response: Addresses every bullet point."
    });

    let bundle = decomposer(ModuleKind::Writing).decompose(&raw);

    // structured field
    assert_eq!(bundle.criteria.coherence, "Ideas flow logically.");
    // named section entry
    assert_eq!(bundle.criteria.lexical, "Wide range of idioms.");
    // section marker in the narrative
    assert_eq!(bundle.criteria.grammar, "Accurate tense use.\nTask response: Addresses every bullet point.");
    // label pattern in the narrative
    assert_eq!(bundle.criteria.task_achievement, "Addresses every bullet point.");
}

#[test]
fn unusable_payloads_degrade_to_placeholders() {
    for raw in [JsonValue::Null, json!(42), json!({}), json!("   ")] {
        let bundle = decomposer(ModuleKind::Speaking).decompose(&raw);
        assert!(!bundle.score_found, "{:?}", raw);
        assert_eq!(bundle.score, 0.0);
        assert_eq!(bundle.overall, NO_EVALUATION);
        assert_eq!(bundle.criteria.grammar, NO_EVALUATION);
        assert_eq!(bundle.narratives.len(), 4);
        assert!(bundle.narratives.iter().all(|n| n.text == NO_EVALUATION));
        assert!(bundle.general.is_none());
    }
}

#[test]
fn structured_section_feedback_wins_over_markers() {
    let raw = json!({
        "parts": { "part 1.1": "Structured note." },
        "comment": "[Part 1.1] Marker note. [Part 3] Discussion was thoughtful."
    });
    let bundle = decomposer(ModuleKind::Speaking).decompose(&raw);

    assert_eq!(bundle.narrative("part1_1"), "Structured note.");
    assert_eq!(bundle.narrative("part3"), "Discussion was thoughtful.");

    let listed = json!({ "sections": [ { "name": "Task 2", "feedback": "Clear thesis." } ] });
    let bundle = decomposer(ModuleKind::Writing).decompose(&listed);
    assert_eq!(bundle.narrative("task2"), "Clear thesis.");
    assert_eq!(bundle.narrative("task1"), NO_EVALUATION);
}

#[test]
fn general_feedback_is_collected() {
    let raw = json!({
        "general_feedback": {
            "summary": "Steady progress since the last mock.",
            "recurring_gaps": ["Articles", "Prepositions"],
            "corrections": [
                { "quote": "I goed there", "correction": "I went there" },
                { "quote": "missing correction" }
            ],
            "exercises": "Practise past tense daily."
        }
    });
    let general = decomposer(ModuleKind::Writing)
        .decompose(&raw)
        .general
        .expect("general feedback");

    assert_eq!(general.summary, "Steady progress since the last mock.");
    assert_eq!(general.recurring_gaps, vec!["Articles", "Prepositions"]);
    assert_eq!(general.corrections.len(), 1);
    assert_eq!(general.corrections[0].correction, "I went there");
    assert_eq!(general.exercises, vec!["Practise past tense daily."]);
    assert_eq!(general.closing_note, NO_EVALUATION);

    let summary_only = decomposer(ModuleKind::Writing).decompose(&json!({ "general": "Keep reading daily." }));
    assert_eq!(summary_only.general.map(|g| g.summary), Some("Keep reading daily.".to_string()));
}

#[test]
fn sanitizer_drops_claims_that_contradict_answers() {
    let source = AnswerSource::new(
        SourceKind::Structured,
        vec![CandidateAnswer {
            question_id: Some("s7".into()),
            question_text: None,
            answer: "I would like to describe my favourite city.".into(),
            ordinal: Some(7),
            bucket_hint: None,
        }],
    );
    let answers = AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Speaking)).reconcile(&[source]);
    assert_eq!(answers.answered_buckets(), vec!["part2"]);

    let raw = json!({
        "overall": "Part 2 was left blank. Part 3 was left blank. The candidate used good linking words.",
        "parts": { "Part 2": "You did not answer Part 2. Try to speak for two minutes." },
        "general": { "summary": "Bölüm 2 boş bırakılmış. Akıcılık iyi." }
    });
    let bundle = decomposer(ModuleKind::Speaking).decompose_for(&raw, &answers);

    assert_eq!(bundle.overall, "Part 3 was left blank. The candidate used good linking words.");
    assert_eq!(bundle.narrative("part2"), "Try to speak for two minutes.");
    assert_eq!(bundle.general.map(|g| g.summary), Some("Akıcılık iyi.".to_string()));
}

#[test]
fn sanitizer_replaces_fully_contradicted_text_with_placeholder() {
    let source = AnswerSource::new(
        SourceKind::Flat,
        vec![
            CandidateAnswer {
                question_id: Some("w1".into()),
                answer: "Dear Sir, I am writing to complain.".into(),
                ordinal: Some(1),
                ..Default::default()
            },
            CandidateAnswer {
                question_id: Some("w2".into()),
                answer: "Technology has changed education.".into(),
                ordinal: Some(2),
                ..Default::default()
            },
        ],
    );
    let answers = AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Writing)).reconcile(&[source]);

    // generic claim, every task answered
    let raw = json!({ "grammar": "The candidate did not answer the questions." });
    let bundle = decomposer(ModuleKind::Writing).decompose_for(&raw, &answers);
    assert_eq!(bundle.criteria.grammar, NO_EVALUATION);
}

fn speaking_answers(ordinals: &[u32]) -> exam_session_backend::models::answer_source::ReconciledAnswers {
    let source = AnswerSource::new(
        SourceKind::Structured,
        ordinals
            .iter()
            .map(|&n| CandidateAnswer {
                question_id: Some(format!("s{}", n)),
                answer: format!("Spoken answer {}", n),
                ordinal: Some(n),
                ..Default::default()
            })
            .collect(),
    );
    AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Speaking)).reconcile(&[source])
}

#[test]
fn blank_claims_are_tied_to_their_own_clause() {
    let answers = speaking_answers(&[1]);
    assert_eq!(answers.answered_buckets(), vec!["part1_1"]);

    let raw = json!({
        "overall": "Part 1.1 was good but Part 3 was left blank. Keep practising.",
        "coherence": "Part 3 was well argued; however Part 1.1 was left blank."
    });
    let bundle = decomposer(ModuleKind::Speaking).decompose_for(&raw, &answers);

    assert_eq!(bundle.overall, "Part 1.1 was good but Part 3 was left blank. Keep practising.");
    assert_eq!(bundle.criteria.coherence, NO_EVALUATION);
}

#[test]
fn blank_as_a_noun_is_not_a_claim() {
    let source = AnswerSource::new(
        SourceKind::Flat,
        (1..=3).map(|n| CandidateAnswer {
            question_id: Some(format!("r{}", n)),
            answer: "B".into(),
            ordinal: Some(n),
            ..Default::default()
        })
        .collect(),
    );
    let answers = AnswerReconciler::new(BucketLayout::default_for(ModuleKind::Reading)).reconcile(&[source]);

    let raw = json!({ "overall": "Your fill-in-the-blank answers were accurate.\nGreat reading speed." });
    let bundle = decomposer(ModuleKind::Reading).decompose_for(&raw, &answers);
    assert_eq!(bundle.overall, "Your fill-in-the-blank answers were accurate.\nGreat reading speed.");
}

#[test]
fn sanitizing_keeps_line_breaks() {
    let answers = speaking_answers(&[1, 4, 7, 9]);

    let raw = json!({
        "grammar": "Good range of tenses.\n\nPart 2 was left blank.\nWatch your articles.",
        "coherence": "Ideas were linked well.\nPauses were short."
    });
    let bundle = decomposer(ModuleKind::Speaking).decompose_for(&raw, &answers);

    assert_eq!(bundle.criteria.grammar, "Good range of tenses.\n\nWatch your articles.");
    assert_eq!(bundle.criteria.coherence, "Ideas were linked well.\nPauses were short.");
}

#[test]
fn markers_split_narrative_into_blocks() {
    let (preamble, blocks) = split_markers("Intro text.\n[Task 1] Letter.\n[Task 2] Essay.");
    assert_eq!(preamble, "Intro text.");
    assert_eq!(
        blocks,
        vec![
            MarkedBlock {
                label: "Task 1".into(),
                body: "Letter.".into()
            },
            MarkedBlock {
                label: "Task 2".into(),
                body: "Essay.".into()
            },
        ]
    );

    let (preamble, blocks) = split_markers("No markers here.");
    assert_eq!(preamble, "No markers here.");
    assert!(blocks.is_empty());
}

#[test]
fn embedded_json_is_found_in_prose() {
    let value = parse_embedded("Here is the result: {\"score\": 5} thanks").expect("embedded object");
    assert_eq!(value, json!({ "score": 5 }));
    assert!(parse_embedded("just words").is_none());

    let nested = json!({ "data": "{\"grammar\": \"Fine\"}" });
    let unwrapped = unwrap_payload(&nested);
    let object = unwrapped.object.expect("object");
    assert_eq!(object["data"], json!({ "grammar": "Fine" }));
    assert!(unwrapped.narrative.is_none());
}
