//! Dataset subset selector.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which partition of a dataset to materialise.
///
/// Parses from and prints as the subset names used in dataset files and on
/// the command line.
///
/// ```rust
/// use aqsol_core::Split;
///
/// let split: Split = "valid".parse().unwrap();
/// assert_eq!(split, Split::Valid);
/// assert_eq!(split.to_string(), "valid");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Rows used to fit the head. SMILES augmentation applies here only.
    #[default]
    Train,
    /// Held-out rows for model selection.
    Valid,
    /// Rows reserved for final evaluation.
    Test,
}

impl Split {
    /// All splits in canonical order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    /// Whether this is the training subset.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    /// Whether this subset is only evaluated (valid or test).
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        matches!(self, Split::Valid | Split::Test)
    }

    /// Subset name as written in file names (`train`, `valid`, `test`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl FromStr for Split {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "valid" | "val" | "validation" => Ok(Split::Valid),
            "test" => Ok(Split::Test),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown subset '{other}', expected train, valid or test"
            ))),
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
