use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four skill modules of an exam session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Listening,
    Reading,
    Writing,
    Speaking,
}

impl ModuleKind {
    /// Exam convention order, not alphabetical.
    pub const EXAM_ORDER: [ModuleKind; 4] = [
        ModuleKind::Listening,
        ModuleKind::Reading,
        ModuleKind::Writing,
        ModuleKind::Speaking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Listening => "listening",
            ModuleKind::Reading => "reading",
            ModuleKind::Writing => "writing",
            ModuleKind::Speaking => "speaking",
        }
    }

    pub fn exam_position(&self) -> usize {
        Self::EXAM_ORDER
            .iter()
            .position(|k| k == self)
            .unwrap_or(Self::EXAM_ORDER.len())
    }

    /// Writing and speaking answers are nested section trees, the others flat maps.
    pub fn is_productive(&self) -> bool {
        matches!(self, ModuleKind::Writing | ModuleKind::Speaking)
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "listening" => Ok(ModuleKind::Listening),
            "reading" => Ok(ModuleKind::Reading),
            "writing" => Ok(ModuleKind::Writing),
            "speaking" => Ok(ModuleKind::Speaking),
            other => Err(crate::error::Error::BadRequest(format!(
                "Unknown module kind '{}'",
                other
            ))),
        }
    }
}
