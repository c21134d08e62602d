use crate::services::reconcile::layout::BucketLayout;
use crate::services::reconcile::normalize::fold_text;
use regex::Regex;
use std::sync::OnceLock;

// Both patterns run on folded text: lowercase ASCII, punctuation turned into spaces.
fn reference_regex() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| {
        Regex::new(r"\b(part|section|task|question set|bolum|gorev|kisim)\s+(\d+(?:\s\d+)?)\b")
            .expect("valid reference pattern")
    })
}

fn blank_claim_regex() -> &'static Regex {
    static BLANK: OnceLock<Regex> = OnceLock::new();
    BLANK.get_or_init(|| {
        Regex::new(concat!(
            r"\b((left|was|were|is|are|been) (blank|empty)|left empty|not answered|unanswered|no answer|no response|",
            r"did not (answer|respond|attempt|complete|provide)|didn t (answer|respond|attempt|provide)|",
            r"not attempted|",
            r"bos birak\w*|bos kal\w*|yanitlanmam\w*|cevaplanmam\w*|yanit verilmem\w*|cevap verilmem\w*|",
            r"yanit vermem\w*|cevap vermem\w*|yanit yok|cevap yok)"
        ))
        .expect("valid blank claim pattern")
    })
}

// Contrastive conjunctions; a blank claim only covers the clause it sits in.
fn clause_break_regex() -> &'static Regex {
    static BREAK: OnceLock<Regex> = OnceLock::new();
    BREAK.get_or_init(|| {
        Regex::new(r"\b(but|however|whereas|although|though|ama|fakat|ancak|oysa)\b")
            .expect("valid clause break pattern")
    })
}

/// Sentence spans ending at `.`, `!` or `?` followed by whitespace, or at a line break.
/// Each span keeps its trailing whitespace so line breaks survive. "Part 1.1" stays in one piece.
fn sentences(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        let next = chars.peek().map(|(_, n)| *n);
        let boundary = c == '\n' || (matches!(c, '.' | '!' | '?') && next.map_or(true, char::is_whitespace));
        if boundary {
            let mut end = idx + c.len_utf8();
            while let Some(&(ws_idx, ws)) = chars.peek() {
                if !ws.is_whitespace() {
                    break;
                }
                end = ws_idx + ws.len_utf8();
                chars.next();
            }
            spans.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        spans.push(&text[start..]);
    }
    spans
}

/// Drops grading artifacts that contradict the reconciled answers, such as "Part 2 was left
/// blank" when part 2 holds an answer.
pub struct Sanitizer<'a> {
    layout: &'a BucketLayout,
    answered: Vec<bool>,
}

impl<'a> Sanitizer<'a> {
    pub fn new(layout: &'a BucketLayout, answered_keys: &[String]) -> Self {
        let answered = layout
            .buckets
            .iter()
            .map(|b| answered_keys.contains(&b.key))
            .collect();
        Self { layout, answered }
    }

    pub fn clean(&self, text: &str) -> String {
        let kept: String = sentences(text)
            .into_iter()
            .filter(|sentence| !self.contradicts(sentence))
            .collect();
        kept.trim().to_string()
    }

    fn contradicts(&self, sentence: &str) -> bool {
        sentence
            .split(';')
            .map(fold_text)
            .any(|part| clause_break_regex().split(&part).any(|clause| self.clause_contradicts(clause)))
    }

    fn clause_contradicts(&self, clause: &str) -> bool {
        if !blank_claim_regex().is_match(clause) {
            return false;
        }

        let referenced: Vec<usize> = reference_regex()
            .captures_iter(clause)
            .filter_map(|c| Some(format!("{} {}", c.get(1)?.as_str(), c.get(2)?.as_str())))
            .flat_map(|label| self.layout.buckets_matching(&label))
            .collect();

        if referenced.is_empty() {
            // a generic "did not answer" only contradicts a fully answered module
            !self.answered.is_empty() && self.answered.iter().all(|a| *a)
        } else {
            referenced.iter().any(|idx| self.answered.get(*idx).copied().unwrap_or(false))
        }
    }
}
