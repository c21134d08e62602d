use crate::models::answer_source::SourceKind;
use std::cmp::Ordering;

/// Quality of one source. Greater is better; the order is total, with the fixed source
/// priority as the final tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceScore {
    pub meaningful: usize,
    pub coverage: usize,
    pub total: usize,
    pub kind: SourceKind,
}

impl SourceScore {
    /// `meaningful / total` compared without floating point.
    fn cmp_ratio(&self, other: &Self) -> Ordering {
        let lhs = self.meaningful as u128 * other.total.max(1) as u128;
        let rhs = other.meaningful as u128 * self.total.max(1) as u128;
        lhs.cmp(&rhs)
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.meaningful as f64 / self.total as f64
        }
    }
}

impl Ord for SourceScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.meaningful
            .cmp(&other.meaningful)
            .then_with(|| self.coverage.cmp(&other.coverage))
            .then_with(|| self.cmp_ratio(other))
            .then_with(|| self.total.cmp(&other.total))
            .then_with(|| self.kind.priority().cmp(&other.kind.priority()))
    }
}

impl PartialOrd for SourceScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
