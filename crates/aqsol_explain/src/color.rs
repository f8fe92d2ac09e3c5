//! Token colouring for molecule highlights.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use aqsol_core::CoreError;

use crate::error::Result;

/// Tokens that denote an atom. Only these positions receive a colour.
pub const ATOM_TOKENS: &[&str] = &[
    "C", "c", "O", "o", "N", "B", "Br", "F", "S", "Cl", "P", "[P]", "I", "n", "[n]", "s", "[s]",
    "[S]", "[P+]", "[B]", "[N+]", "[O-]", "[#6]", "[#7]", "[C@H]", "[C@]", "[C@@]", "[C@@H]",
    "[nH]", "[NH]", "[NH0]", "[SH0]", "[H]", "[N]", "[13C]", "[CH2]", "[CH2+]", "[3H]",
    "[13C@@H]", "[13CH2]", "[I-]", "[Cl+]", "[CH+]", "[CH]", "[2H]", "[11CH]", "[35Cl]",
    "[NH3+]", "[NH2+]", "[CH2-]", "[C-]", "[S+]", "[13CH3]", "[IH+]", "[OH+]", "[S-]",
    "[PH3+]", "[O]", "[OH2+]", "[C]", "[C+]", "[CH-]", "[N-]", "[P-]", "[PH+]", "[13CH]",
    "[18F]", "[n+]",
];

/// Bond, branch, stereo and ring-closure symbols.
pub const NON_ATOM_TOKENS: &[&str] = &[
    "-", "=", "#", "@", "[", "]", "(", ")", ":", "/", "\\", "1", "2", "3", "4", "5", "6", "7",
    "8", "9", "0", "|",
];

/// Whether `token` is in [`ATOM_TOKENS`].
#[must_use]
pub fn is_atom_token(token: &str) -> bool {
    ATOM_TOKENS.contains(&token)
}

/// RGBA colour with components in `[0, 1]`.
pub type Rgba = [f32; 4];

/// Low end of the palette: a pale green-grey.
pub const PALETTE_LOW: Rgba = [0.929, 0.957, 0.929, 1.0];
/// High end of the palette: pure green.
pub const PALETTE_HIGH: Rgba = [0.0, 0.502, 0.0, 1.0];

/// Colour of a normalised score; scores outside `[0, 1]` take the end colour.
#[must_use]
pub fn palette(score: f32) -> Rgba {
    let t = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
    let mut rgba = [0.0; 4];
    for (c, (lo, hi)) in rgba.iter_mut().zip(PALETTE_LOW.iter().zip(&PALETTE_HIGH)) {
        *c = lo + (hi - lo) * t;
    }
    rgba
}

/// Maps relevance weights of atom tokens onto a fixed colour scale.
///
/// `vmin`/`vmax` are fixed at construction, so weights from different
/// molecules share one affine scale `(w - vmin) / (vmax - vmin)`.
///
/// ```rust
/// use aqsol_explain::ColorMapper;
///
/// let mapper = ColorMapper::new(0.0, 2.0).unwrap();
/// let tokens: Vec<String> = ["C", "(", "O", ")"].iter().map(|t| t.to_string()).collect();
/// assert_eq!(mapper.map(&[1.0, 9.0, 2.0, 9.0], &tokens).unwrap(), vec![0.5, 1.0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorMapper {
    vmin: f32,
    vmax: f32,
}

impl ColorMapper {
    /// Mapper with fixed bounds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBounds`] if `vmin > vmax` or either bound
    /// is not finite.
    pub fn new(vmin: f32, vmax: f32) -> Result<Self> {
        if !vmin.is_finite() || !vmax.is_finite() || vmin > vmax {
            return Err(CoreError::InvalidBounds { vmin, vmax }.into());
        }
        Ok(Self { vmin, vmax })
    }

    /// Lower bound.
    #[must_use]
    pub fn vmin(&self) -> f32 {
        self.vmin
    }

    /// Upper bound.
    #[must_use]
    pub fn vmax(&self) -> f32 {
        self.vmax
    }

    /// Weights at atom-token positions, in token order.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EmptyTokenSequence`] for no tokens
    /// - [`CoreError::ShapeMismatch`] if there are more tokens than weights
    pub fn filter_atoms(&self, weights: &[f32], tokens: &[String]) -> Result<Vec<f32>> {
        if tokens.is_empty() {
            return Err(CoreError::EmptyTokenSequence.into());
        }
        if tokens.len() > weights.len() {
            return Err(CoreError::shape(format!(
                "{} tokens but only {} weights",
                tokens.len(),
                weights.len()
            ))
            .into());
        }
        Ok(tokens
            .iter()
            .zip(weights)
            .filter(|(token, _)| is_atom_token(token))
            .map(|(_, &w)| w)
            .collect())
    }

    /// Affine normalisation without clipping. Equal bounds map to 0.
    #[must_use]
    pub fn normalize(&self, weight: f32) -> f32 {
        let range = self.vmax - self.vmin;
        if range == 0.0 {
            0.0
        } else {
            (weight - self.vmin) / range
        }
    }

    /// Normalised scores of the atom tokens.
    pub fn map(&self, weights: &[f32], tokens: &[String]) -> Result<Vec<f32>> {
        Ok(self
            .filter_atoms(weights, tokens)?
            .into_iter()
            .map(|w| self.normalize(w))
            .collect())
    }

    /// Atom index to colour, for already normalised scores.
    #[must_use]
    pub fn to_atom_colors(&self, scores: &[f32]) -> BTreeMap<usize, Rgba> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| (i, palette(s)))
            .collect()
    }
}

/// Label drawn under a highlighted molecule.
#[must_use]
pub fn highlight_label(exp_log_s: f32, predicted: f32, smiles: &str) -> String {
    format!("Exp logS: {exp_log_s:.2}, predicted: {predicted:.2}\n{smiles}")
}

/// Everything an external drawing tool needs to render one highlighted
/// molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoleculeHighlight {
    /// Molecule.
    pub smiles: String,
    /// Tokens aligned with the relevance weights.
    pub tokens: Vec<String>,
    /// Raw relevance of the atom tokens.
    pub atom_weights: Vec<f32>,
    /// Normalised relevance of the atom tokens.
    pub atom_scores: Vec<f32>,
    /// Atom index to RGBA.
    pub atom_colors: BTreeMap<usize, Rgba>,
    /// Caption.
    pub label: String,
}

impl MoleculeHighlight {
    /// Build the highlight for one molecule.
    pub fn new(
        mapper: &ColorMapper,
        smiles: impl Into<String>,
        tokens: Vec<String>,
        weights: &[f32],
        exp_log_s: f32,
        predicted: f32,
    ) -> Result<Self> {
        let smiles = smiles.into();
        let atom_weights = mapper.filter_atoms(weights, &tokens)?;
        let atom_scores: Vec<f32> = atom_weights.iter().map(|&w| mapper.normalize(w)).collect();
        let atom_colors = mapper.to_atom_colors(&atom_scores);
        let label = highlight_label(exp_log_s, predicted, &smiles);

        Ok(Self {
            smiles,
            tokens,
            atom_weights,
            atom_scores,
            atom_colors,
            label,
        })
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExplainError;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_vocabularies_are_disjoint() {
        for t in NON_ATOM_TOKENS {
            assert!(!is_atom_token(t), "{t}");
        }
        let mut sorted = ATOM_TOKENS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ATOM_TOKENS.len());
    }

    #[test]
    fn test_bond_only_tokens_are_dropped() {
        let mapper = ColorMapper::new(0.0, 1.0).unwrap();
        let kept = mapper
            .filter_atoms(&[0.1, 0.2, 0.3, 0.4], &tokens(&["-", "=", "(", ")"]))
            .unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_shared_affine_scale() {
        let mapper = ColorMapper::new(-1.0, 3.0).unwrap();
        let toks = tokens(&["C", "O", "N"]);
        let a = mapper.map(&[-1.0, 1.0, 3.0], &toks).unwrap();
        let b = mapper.map(&[0.0, 2.0, 5.0], &toks).unwrap();

        assert_eq!(a, vec![0.0, 0.5, 1.0]);
        // same slope 1/4 and offset 1/4 for both calls, no clipping
        assert_eq!(b, vec![0.25, 0.75, 1.5]);
    }

    #[test]
    fn test_equal_bounds_map_to_zero() {
        let mapper = ColorMapper::new(0.5, 0.5).unwrap();
        assert_eq!(mapper.map(&[0.1, 9.0], &tokens(&["C", "c"])).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(matches!(
            ColorMapper::new(1.0, 0.0),
            Err(ExplainError::Core(CoreError::InvalidBounds { .. }))
        ));
    }

    #[test]
    fn test_filter_errors() {
        let mapper = ColorMapper::new(0.0, 1.0).unwrap();
        assert!(matches!(
            mapper.filter_atoms(&[1.0], &[]),
            Err(ExplainError::Core(CoreError::EmptyTokenSequence))
        ));
        assert!(matches!(
            mapper.filter_atoms(&[1.0], &tokens(&["C", "O"])),
            Err(ExplainError::Core(CoreError::ShapeMismatch(_)))
        ));
    }

    #[test]
    fn test_palette_ends_and_clipping() {
        assert_eq!(palette(0.0), PALETTE_LOW);
        assert_eq!(palette(1.0), PALETTE_HIGH);
        assert_eq!(palette(-3.0), PALETTE_LOW);
        assert_eq!(palette(7.0), PALETTE_HIGH);
        let mid = palette(0.5);
        assert!((mid[1] - (0.957 + 0.502) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_molecule_highlight() {
        let mapper = ColorMapper::new(0.0, 1.0).unwrap();
        let toks = tokens(&["C", "C", "(", "=", "O", ")", "O"]);
        let weights = [0.2, 0.4, 0.0, 0.0, 1.0, 0.0, 0.6];

        let hl = MoleculeHighlight::new(&mapper, "CC(=O)O", toks, &weights, -0.17, 0.05).unwrap();
        assert_eq!(hl.atom_weights, vec![0.2, 0.4, 1.0, 0.6]);
        assert_eq!(hl.atom_colors.len(), 4);
        assert_eq!(hl.atom_colors[&2], PALETTE_HIGH);
        assert_eq!(hl.label, "Exp logS: -0.17, predicted: 0.05\nCC(=O)O");
    }
}
