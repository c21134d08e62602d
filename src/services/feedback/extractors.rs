use crate::models::feedback::{Criterion, NO_EVALUATION};
use crate::services::feedback::unwrap::{unwrap_payload, Unwrapped};
use crate::services::reconcile::normalize::{compact_key, is_meaningful_feedback};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::OnceLock;

// Key variants in priority order, compared after `compact_key` folding.
pub const SCORE_KEYS: &[&str] = &[
    "score",
    "overallscore",
    "overallband",
    "bandscore",
    "puan",
    "genelpuan",
    "toplampuan",
    "band",
];
pub const OVERALL_KEYS: &[&str] = &[
    "overallfeedback",
    "overall",
    "overallcomment",
    "genelyorum",
    "feedback",
    "geribildirim",
    "comment",
    "yorum",
];
pub const GENERAL_KEYS: &[&str] = &[
    "generalfeedback",
    "general",
    "geneldegerlendirme",
    "genelgeribildirim",
];
const CONTAINER_KEYS: &[&str] = &[
    "criteria",
    "kriterler",
    "scores",
    "puanlar",
    "evaluation",
    "degerlendirme",
    "feedback",
    "result",
    "data",
];
const SECTION_KEYS: &[&str] = &["sections", "bolumler", "details", "analysis", "analiz"];
pub const BUCKET_KEYS: &[&str] = &[
    "parts",
    "partfeedback",
    "bolumyorumlari",
    "sections",
    "bolumler",
    "narratives",
];
const NAME_KEYS: &[&str] = &["name", "title", "label", "criterion", "kriter", "part", "section", "baslik", "key"];
const TEXT_KEYS: &[&str] = &[
    "feedback",
    "narrative",
    "comment",
    "text",
    "yorum",
    "aciklama",
    "geribildirim",
    "summary",
];

fn criterion_keys(criterion: Criterion) -> &'static [&'static str] {
    match criterion {
        Criterion::Coherence => &[
            "coherence",
            "coherenceandcohesion",
            "coherencecohesion",
            "fluencyandcoherence",
            "tutarlilik",
            "tutarlilikvebagdaslik",
            "akicilikvetutarlilik",
            "akicilik",
        ],
        Criterion::Grammar => &[
            "grammar",
            "grammaticalrangeandaccuracy",
            "grammaticalaccuracy",
            "grammaticalrange",
            "dilbilgisi",
            "gramer",
        ],
        Criterion::Lexical => &[
            "lexical",
            "lexicalresource",
            "vocabulary",
            "kelimebilgisi",
            "kelimedagarcigi",
            "sozcukdagarcigi",
        ],
        Criterion::TaskAchievement => &[
            "taskachievement",
            "taskresponse",
            "taskfulfilment",
            "taskfulfillment",
            "gorevbasarisi",
            "gorevtamamlama",
            "gorevyaniti",
        ],
    }
}

fn criterion_pattern(criterion: Criterion) -> &'static str {
    match criterion {
        Criterion::Coherence => {
            r"coherence(?:\s*(?:and|&)\s*cohesion)?|fluency\s*(?:and|&)\s*coherence|tutarl[ıi]l[ıi]k(?:\s*ve\s*ba[ğg]da[şs][ıi]kl[ıi]k)?|ak[ıi]c[ıi]l[ıi]k(?:\s*ve\s*tutarl[ıi]l[ıi]k)?"
        }
        Criterion::Grammar => {
            r"grammatical\s*range(?:\s*(?:and|&)\s*accuracy)?|grammar|dil\s*bilgisi|gramer"
        }
        Criterion::Lexical => {
            r"lexical\s*resource|lexical|vocabulary|kelime\s*(?:bilgisi|da[ğg]arc[ıi][ğg][ıi])|s[öo]zc[üu]k\s*da[ğg]arc[ıi][ğg][ıi]"
        }
        Criterion::TaskAchievement => {
            r"task\s*(?:achievement|response|fulfil{1,2}ment)|g[öo]rev\s*(?:ba[şs]ar[ıi]s[ıi]|tamamlama|yan[ıi]t[ıi])"
        }
    }
}

fn pattern_regexes() -> &'static [(Criterion, Regex)] {
    static PATTERNS: OnceLock<Vec<(Criterion, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        Criterion::ALL
            .iter()
            .map(|&criterion| {
                let pattern = format!(
                    r"(?im)^[\s\-*#>•]*(?:\*\*|__)?\s*(?:{})\s*(?:\*\*|__)?\s*(?:\([^)\n]*\))?\s*(?:\*\*)?\s*[:=\-\x{{2013}}\x{{2014}}]\s*(?:\*\*)?\s*(.+?)\s*$",
                    criterion_pattern(criterion)
                );
                (criterion, Regex::new(&pattern).expect("valid criterion pattern"))
            })
            .collect()
    })
}

fn score_regex() -> &'static Regex {
    static SCORE: OnceLock<Regex> = OnceLock::new();
    SCORE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:overall\s*(?:score|band)|band\s*score|score|band|genel\s*puan|toplam\s*puan|puan)\s*[:=]?\s*(\d+(?:[.,]\d+)?)",
        )
        .expect("valid score pattern")
    })
}

fn number_regex() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"^\s*(\d+(?:[.,]\d+)?)").expect("valid number pattern"))
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[([^\[\]\r\n]{1,48})\]").expect("valid marker pattern"))
}

/// First entry of `map` whose folded key equals one of `keys`, tried in `keys` order.
pub fn lookup<'a>(map: &'a Map<String, JsonValue>, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter().find_map(|wanted| {
        map.iter()
            .find(|(key, _)| compact_key(key) == *wanted)
            .map(|(_, value)| value)
    })
}

/// Meaningful text held by a value: a string, an object's text field, or a list of strings.
pub fn text_of(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.trim().to_string()).filter(|t| is_meaningful_feedback(t)),
        JsonValue::Object(map) => TEXT_KEYS
            .iter()
            .filter_map(|key| lookup(map, std::slice::from_ref(key)))
            .find_map(text_of),
        JsonValue::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|t| is_meaningful_feedback(t))
                .map(str::to_string)
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => None,
    }
}

pub fn number_of(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => number_regex()
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().replace(',', ".").parse().ok()),
        JsonValue::Object(map) => lookup(map, SCORE_KEYS).and_then(number_of),
        _ => None,
    }
}

/// A `[LABEL]` block of a narrative, running to the next marker or the end of text.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkedBlock {
    pub label: String,
    pub body: String,
}

/// Splits a narrative on `[LABEL]` markers. Returns the text before the first marker too.
pub fn split_markers(text: &str) -> (String, Vec<MarkedBlock>) {
    let markers: Vec<_> = marker_regex().captures_iter(text).collect();
    let Some(first) = markers.first().and_then(|c| c.get(0)) else {
        return (text.trim().to_string(), Vec::new());
    };
    let preamble = text[..first.start()].trim().to_string();

    let mut blocks = Vec::with_capacity(markers.len());
    for (idx, captures) in markers.iter().enumerate() {
        let (Some(whole), Some(label)) = (captures.get(0), captures.get(1)) else { continue };
        let end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        blocks.push(MarkedBlock {
            label: label.as_str().trim().to_string(),
            body: text[whole.end()..end].trim().to_string(),
        });
    }
    (preamble, blocks)
}

/// The decoded payload plus everything derived from it once.
#[derive(Debug, Clone, Default)]
pub struct PreparedFeedback {
    pub object: Option<Map<String, JsonValue>>,
    /// Free text for pattern extraction.
    pub narrative: Option<String>,
    /// True when the payload was plain text rather than an object.
    pub plain: bool,
    pub preamble: String,
    pub blocks: Vec<MarkedBlock>,
}

impl PreparedFeedback {
    pub fn from_raw(raw: &JsonValue) -> Self {
        let Unwrapped { object, narrative } = unwrap_payload(raw);
        let plain = object.is_none() && narrative.is_some();
        let narrative = narrative.or_else(|| object.as_ref().and_then(joined_strings));
        let (preamble, blocks) = narrative.as_deref().map(split_markers).unwrap_or_default();
        Self {
            object,
            narrative,
            plain,
            preamble,
            blocks,
        }
    }

    /// The root object followed by nested criteria/evaluation containers, two levels deep.
    pub fn scopes(&self) -> Vec<&Map<String, JsonValue>> {
        let Some(root) = self.object.as_ref() else {
            return Vec::new();
        };
        let mut scopes = vec![root];
        let mut idx = 0;
        while idx < scopes.len() && idx < 3 {
            let scope = scopes[idx];
            for key in CONTAINER_KEYS {
                if let Some(JsonValue::Object(inner)) = lookup(scope, std::slice::from_ref(key)) {
                    if !scopes.iter().any(|s| std::ptr::eq(*s, inner)) {
                        scopes.push(inner);
                    }
                }
            }
            idx += 1;
        }
        scopes
    }

    pub fn find(&self, keys: &[&str]) -> Option<&JsonValue> {
        self.scopes().into_iter().find_map(|scope| lookup(scope, keys))
    }

    /// Named entries of every section container: `{label: value}` maps and arrays of
    /// objects carrying a name field.
    pub fn named_entries(&self, containers: &[&str]) -> Vec<(String, JsonValue)> {
        let mut entries = Vec::new();
        for scope in self.scopes() {
            let Some(container) = lookup(scope, containers) else { continue };
            match container {
                JsonValue::Object(map) => {
                    entries.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                JsonValue::Array(items) => {
                    for item in items {
                        let Some(map) = item.as_object() else { continue };
                        if let Some(name) = lookup(map, NAME_KEYS).and_then(|v| v.as_str()) {
                            entries.push((name.to_string(), item.clone()));
                        }
                    }
                }
                _ => {}
            }
        }
        entries
    }
}

fn joined_strings(map: &Map<String, JsonValue>) -> Option<String> {
    let parts: Vec<&str> = map
        .values()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}

/// Structured score field first, then a "score: 6.5" phrase in the narrative.
pub fn extract_score(prepared: &PreparedFeedback) -> Option<f64> {
    prepared
        .find(SCORE_KEYS)
        .and_then(number_of)
        .or_else(|| {
            let narrative = prepared.narrative.as_deref()?;
            score_regex()
                .captures(narrative)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().replace(',', ".").parse().ok())
        })
        .filter(|score: &f64| score.is_finite())
}

/// Criterion extractors, tried in order until one yields meaningful text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    StructuredField,
    SectionNarrative,
    NarrativePattern,
    Fallback,
}

impl Strategy {
    pub const PIPELINE: [Strategy; 4] = [
        Strategy::StructuredField,
        Strategy::SectionNarrative,
        Strategy::NarrativePattern,
        Strategy::Fallback,
    ];

    pub fn extract(&self, prepared: &PreparedFeedback, criterion: Criterion) -> Option<String> {
        let keys = criterion_keys(criterion);
        match self {
            Strategy::StructuredField => prepared
                .scopes()
                .into_iter()
                .filter_map(|scope| lookup(scope, keys))
                .find_map(text_of),
            Strategy::SectionNarrative => {
                let named = prepared
                    .named_entries(SECTION_KEYS)
                    .into_iter()
                    .filter(|(name, _)| keys.contains(&compact_key(name).as_str()))
                    .find_map(|(_, value)| text_of(&value));
                named.or_else(|| {
                    prepared
                        .blocks
                        .iter()
                        .filter(|b| keys.contains(&compact_key(&b.label).as_str()))
                        .map(|b| b.body.trim().to_string())
                        .find(|body| is_meaningful_feedback(body))
                })
            }
            Strategy::NarrativePattern => {
                let narrative = prepared.narrative.as_deref()?;
                let (_, regex) = pattern_regexes().iter().find(|(c, _)| *c == criterion)?;
                regex
                    .captures_iter(narrative)
                    .filter_map(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .find(|text| is_meaningful_feedback(text))
            }
            Strategy::Fallback => Some(NO_EVALUATION.to_string()),
        }
    }
}

pub fn extract_criterion(prepared: &PreparedFeedback, criterion: Criterion) -> String {
    for strategy in Strategy::PIPELINE {
        if let Some(text) = strategy.extract(prepared, criterion).filter(|t| is_meaningful_feedback(t)) {
            tracing::trace!(criterion = ?criterion, strategy = ?strategy, "Criterion feedback extracted");
            return text;
        }
    }
    NO_EVALUATION.to_string()
}
