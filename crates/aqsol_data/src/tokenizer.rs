//! SMILES tokenisation.

use regex::Regex;

use aqsol_core::CoreError;

use crate::error::{DataError, Result};

/// Bracket atoms, two-letter halogens, the organic subset, bonds, branches,
/// ring closures (`0`-`9` and `%nn`) and reaction/wildcard symbols.
const SMILES_PATTERN: &str = r"(\[[^\]]+]|Br?|Cl?|N|O|S|P|F|I|b|c|n|o|s|p|\(|\)|\.|=|#|-|\+|\\|/|:|~|@|\?|>>?|\*|\$|%[0-9]{2}|[0-9])";

/// Regex tokenizer that splits SMILES into the atom-level tokens the
/// relevance weights are aligned with.
///
/// ```rust
/// use aqsol_data::SmilesTokenizer;
///
/// let tokens = SmilesTokenizer::new().tokenize("ClC(=O)[nH]1").unwrap();
/// assert_eq!(tokens, ["Cl", "C", "(", "=", "O", ")", "[nH]", "1"]);
/// ```
#[derive(Debug, Clone)]
pub struct SmilesTokenizer {
    regex: Regex,
}

impl SmilesTokenizer {
    /// Create a tokenizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regex: Regex::new(SMILES_PATTERN).expect("SMILES pattern is a valid regex"),
        }
    }

    /// Split `smiles` into tokens.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EmptyTokenSequence`] for blank input.
    /// - [`DataError::Parse`] if some characters are not covered by any token.
    pub fn tokenize(&self, smiles: &str) -> Result<Vec<String>> {
        let smiles = smiles.trim();
        if smiles.is_empty() {
            return Err(CoreError::EmptyTokenSequence.into());
        }

        let mut tokens = Vec::new();
        let mut cursor = 0;
        for m in self.regex.find_iter(smiles) {
            if m.start() != cursor {
                return Err(DataError::Parse(format!(
                    "unrecognised '{}' at offset {} in {smiles}",
                    &smiles[cursor..m.start()],
                    cursor
                )));
            }
            tokens.push(m.as_str().to_string());
            cursor = m.end();
        }
        if cursor != smiles.len() {
            return Err(DataError::Parse(format!(
                "unrecognised '{}' at offset {} in {smiles}",
                &smiles[cursor..],
                cursor
            )));
        }

        Ok(tokens)
    }
}

impl Default for SmilesTokenizer {
    fn default() -> Self {
        Self::new()
    }
}
