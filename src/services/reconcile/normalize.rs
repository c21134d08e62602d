//! Text folding used to recognise "no answer" sentinels in free text.

/// Phrases that only ever mean "no answer" (folded form). Short replies such as "None",
/// "Not given" or "Yok" are real answers and stay out of this list.
const NO_ANSWER_SENTINELS: &[&str] = &[
    "no answer",
    "no response",
    "not answered",
    "unanswered",
    "null",
    "undefined",
    "n a",
    "yanit yok",
    "cevap yok",
    "yanit verilmedi",
    "cevap verilmedi",
    "yanitlanmadi",
    "cevaplanmadi",
];

/// Vacuous grader output that is only filtered out of feedback text (folded form).
const FEEDBACK_FILLERS: &[&str] = &["not given", "none", "na", "yok", "bos", "verilmedi", "not evaluated"];

/// Placeholder phrases emitted by the recording and transcription pipeline (folded form).
const PLACEHOLDER_BLACKLIST: &[&str] = &[
    "answer not provided",
    "no answer provided",
    "no answer given",
    "no transcript available",
    "transcription unavailable",
    "transcript not available",
    "audio not recorded",
    "no recording",
    "no audio",
    "kayit bulunamadi",
    "ses kaydi yok",
    "ses kaydi bulunamadi",
    "yanit bulunamadi",
    "cevap bulunamadi",
    "henuz yanit verilmedi",
    "ogrenci yanit vermedi",
    "transkript yok",
];

fn fold_char(c: char) -> Option<char> {
    let folded = match c {
        'ı' | 'İ' | 'î' | 'Î' | 'í' | 'Í' | 'ì' | 'Ì' | 'ï' | 'Ï' => 'i',
        'ş' | 'Ş' => 's',
        'ğ' | 'Ğ' => 'g',
        'ç' | 'Ç' => 'c',
        'ö' | 'Ö' | 'ó' | 'Ó' | 'ò' | 'Ò' | 'ô' | 'Ô' | 'õ' | 'Õ' => 'o',
        'ü' | 'Ü' | 'ú' | 'Ú' | 'ù' | 'Ù' | 'û' | 'Û' => 'u',
        'â' | 'Â' | 'á' | 'Á' | 'à' | 'À' | 'ä' | 'Ä' | 'ã' | 'Ã' | 'å' | 'Å' => 'a',
        'é' | 'É' | 'è' | 'È' | 'ê' | 'Ê' | 'ë' | 'Ë' => 'e',
        'ñ' | 'Ñ' => 'n',
        // combining diacritical marks
        '\u{0300}'..='\u{036f}' => return None,
        other => other.to_lowercase().next().unwrap_or(other),
    };
    Some(folded)
}

/// Lowercases, strips diacritics, turns punctuation into spaces and collapses whitespace.
pub fn fold_text(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter_map(fold_char)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Folded text without any separators, used for label and key comparison.
pub fn compact_key(text: &str) -> String {
    fold_text(text).replace(' ', "")
}

/// True for empty text and explicit "no answer" phrases. Used on candidate answers.
pub fn is_placeholder(text: &str) -> bool {
    let folded = fold_text(text);
    folded.is_empty()
        || NO_ANSWER_SENTINELS.contains(&folded.as_str())
        || PLACEHOLDER_BLACKLIST.contains(&folded.as_str())
}

pub fn is_meaningful(text: &str) -> bool {
    !is_placeholder(text)
}

/// Character length of a meaningful answer, zero for placeholders.
pub fn meaningful_len(text: &str) -> usize {
    if is_meaningful(text) {
        text.trim().chars().count()
    } else {
        0
    }
}

/// Feedback text worth showing: not a placeholder and not a filler like "not given".
pub fn is_meaningful_feedback(text: &str) -> bool {
    is_meaningful(text) && !FEEDBACK_FILLERS.contains(&fold_text(text).as_str())
}
