use crate::error::{Error, Result};
use crate::models::module_kind::ModuleKind;
use crate::services::reconcile::normalize::compact_key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One canonical section and the ordinals it owns when a source carries no label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRule {
    pub key: String,
    pub label: String,
    pub first_ordinal: u32,
    /// `None` means open-ended.
    #[serde(default)]
    pub last_ordinal: Option<u32>,
    /// Slots rendered even when no source has an answer for them.
    #[serde(default)]
    pub expected_slots: usize,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl BucketRule {
    fn new(key: &str, label: &str, first: u32, last: Option<u32>, expected: usize, hints: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            first_ordinal: first,
            last_ordinal: last,
            expected_slots: expected,
            hints: hints.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn covers(&self, ordinal: u32) -> bool {
        ordinal >= self.first_ordinal && self.last_ordinal.map_or(true, |last| ordinal <= last)
    }

    fn aliases(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(compact_key(&self.key))
            .chain(std::iter::once(compact_key(&self.label)))
            .chain(self.hints.iter().map(|h| compact_key(h)))
            .filter(|a| !a.is_empty())
    }
}

/// Fixed, ordered set of canonical sections for one module (or one test template).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketLayout {
    pub buckets: Vec<BucketRule>,
}

impl BucketLayout {
    pub fn default_for(module: ModuleKind) -> Self {
        let buckets = match module {
            ModuleKind::Speaking => vec![
                BucketRule::new("part1_1", "Part 1.1", 1, Some(3), 3, &["part 1.1", "bölüm 1.1", "kısım 1.1", "1.1"]),
                BucketRule::new("part1_2", "Part 1.2", 4, Some(6), 3, &["part 1.2", "bölüm 1.2", "kısım 1.2", "1.2"]),
                BucketRule::new("part2", "Part 2", 7, Some(7), 1, &["part 2", "bölüm 2", "kısım 2", "2"]),
                BucketRule::new("part3", "Part 3", 8, None, 1, &["part 3", "bölüm 3", "kısım 3", "3"]),
            ],
            ModuleKind::Writing => vec![
                BucketRule::new("task1", "Task 1", 1, Some(1), 1, &["task 1", "görev 1", "part 1", "bölüm 1", "1"]),
                BucketRule::new("task2", "Task 2", 2, None, 1, &["task 2", "görev 2", "part 2", "bölüm 2", "2"]),
            ],
            ModuleKind::Reading | ModuleKind::Listening => {
                vec![BucketRule::new("answers", "Answers", 1, None, 0, &[])]
            }
        };
        Self { buckets }
    }

    /// Index of the bucket for a label, exact alias first, then the longest alias prefix.
    pub fn bucket_for_label(&self, label: &str) -> Option<usize> {
        let wanted = compact_key(label);
        if wanted.is_empty() {
            return None;
        }
        if let Some(idx) = self.buckets.iter().position(|b| b.aliases().any(|a| a == wanted)) {
            return Some(idx);
        }

        let mut best: Option<(usize, usize)> = None;
        for (idx, bucket) in self.buckets.iter().enumerate() {
            for alias in bucket.aliases() {
                if alias.len() > 1 && wanted.starts_with(&alias) && best.map_or(true, |(_, len)| alias.len() > len) {
                    best = Some((idx, alias.len()));
                }
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Like [`Self::bucket_for_label`], but a coarse label ("part 1") also matches every
    /// bucket it is a prefix of ("part 1.1", "part 1.2").
    pub fn buckets_matching(&self, label: &str) -> Vec<usize> {
        if let Some(idx) = self.bucket_for_label(label) {
            return vec![idx];
        }
        let wanted = compact_key(label);
        if wanted.len() < 2 {
            return Vec::new();
        }
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.aliases().any(|a| a.starts_with(&wanted)))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn bucket_for_ordinal(&self, ordinal: u32) -> usize {
        self.buckets
            .iter()
            .position(|b| b.covers(ordinal))
            .unwrap_or(self.buckets.len().saturating_sub(1))
    }

    /// Explicit hint first, ordinal range as fallback.
    pub fn assign(&self, hint: Option<&str>, ordinal: u32) -> usize {
        hint.and_then(|h| self.bucket_for_label(h))
            .unwrap_or_else(|| self.bucket_for_ordinal(ordinal))
    }
}

/// Default layouts per module, overridable per module or per `module:test_id`.
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    overrides: HashMap<String, BucketLayout>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `{ "speaking": {...}, "speaking:test-42": {...} }`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let overrides: HashMap<String, BucketLayout> = serde_json::from_str(&raw)?;
        for (key, layout) in &overrides {
            if layout.buckets.is_empty() {
                return Err(Error::Config(format!("Bucket layout '{}' has no buckets", key)));
            }
        }
        Ok(Self { overrides })
    }

    pub fn with_override(mut self, key: impl Into<String>, layout: BucketLayout) -> Self {
        self.overrides.insert(key.into(), layout);
        self
    }

    pub fn layout_for(&self, module: ModuleKind, test_id: Option<&str>) -> BucketLayout {
        test_id
            .and_then(|t| self.overrides.get(&format!("{}:{}", module, t)))
            .or_else(|| self.overrides.get(module.as_str()))
            .cloned()
            .unwrap_or_else(|| BucketLayout::default_for(module))
    }
}
