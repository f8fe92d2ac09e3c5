//! Solubility datasets read from CSV.
//!
//! Two layouts are supported:
//!
//! - AqueousSolu: one row per solute with the averaged aqueous logS
//!   (`smiles solute`, `logS_aq_avg`, `logS_aq_std`, `count`).
//! - CombiSolu: solute/solvent pairs measured at a temperature
//!   (`solute_smiles`, `solvent_smiles`, `temperature`,
//!   `solvent_density [kg/m3]`, `experimental_logS [mol/L]`).
//!
//! Held-out test rows live in their own file, so the `Test` subset of a
//! dataset is the whole file while `Train`/`Valid` are a contiguous
//! partition at the given ratio.

use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use aqsol_core::{CoreError, Split};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::splits::contiguous_partition;

/// AqueousSolu rows at or above this logS are dropped as outliers.
pub const AQSOL_OUTLIER_LOGS: f32 = 2.05;

/// Min-max scaler for logS labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelScaler {
    min: f32,
    max: f32,
}

impl LabelScaler {
    /// Create a scaler over `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `max > min`.
    pub fn new(min: f32, max: f32) -> Result<Self> {
        if min.is_nan() || max.is_nan() || max <= min {
            return Err(CoreError::InvalidConfig(format!(
                "label range must satisfy max > min, got [{min}, {max}]"
            ))
            .into());
        }
        Ok(Self { min, max })
    }

    /// Fit on a label slice.
    pub fn fit(labels: &[f32]) -> Result<Self> {
        let (min, max) = label_range(labels).ok_or(DataError::EmptyDataset)?;
        Self::new(min, max)
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Map logS into `[0, 1]`.
    #[must_use]
    pub fn scale(&self, log_s: f32) -> f32 {
        (log_s - self.min) / (self.max - self.min)
    }

    /// Map a scaled value back to logS.
    #[must_use]
    pub fn unscale(&self, scaled: f32) -> f32 {
        scaled * (self.max - self.min) + self.min
    }
}

fn label_range(labels: &[f32]) -> Option<(f32, f32)> {
    labels.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn subset_range(n: usize, subset: Split, ratio: f64) -> Result<Range<usize>> {
    match subset {
        Split::Test => Ok(0..n),
        Split::Train => Ok(contiguous_partition(n, ratio)?.0),
        Split::Valid => Ok(contiguous_partition(n, ratio)?.1),
    }
}

fn read_records<T, R>(reader: R) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();
    for record in rdr.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// One row of the AqueousSolu CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqSolRecord {
    /// Solute SMILES.
    #[serde(rename = "smiles solute")]
    pub smiles: String,
    /// Averaged aqueous logS; unparsable cells become `None`.
    #[serde(rename = "logS_aq_avg", deserialize_with = "csv::invalid_option")]
    pub log_s: Option<f32>,
    /// Standard deviation across measurements.
    #[serde(
        rename = "logS_aq_std",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    pub log_s_std: Option<f32>,
    /// Number of measurements averaged.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub count: Option<u32>,
}

/// Aqueous solubility dataset: SMILES plus experimental logS.
#[derive(Debug, Clone)]
pub struct AqSolDataset {
    subset: Split,
    smiles: Vec<String>,
    labels: Vec<f32>,
    min: f32,
    max: f32,
}

impl AqSolDataset {
    /// Load `subset` from an AqueousSolu CSV file.
    ///
    /// `ratio` is the fraction of rows assigned to `Train`; the rest form
    /// `Valid`. It is ignored for `Test`.
    pub fn from_csv<P: AsRef<Path>>(path: P, subset: Split, ratio: f64) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, subset, ratio)
    }

    /// Load `subset` from any CSV source.
    pub fn from_reader<R: Read>(reader: R, subset: Split, ratio: f64) -> Result<Self> {
        Self::from_records(read_records(reader)?, subset, ratio)
    }

    /// Build `subset` from parsed records.
    ///
    /// Rows without a finite label, and rows at or above
    /// [`AQSOL_OUTLIER_LOGS`], are dropped before the label range is taken.
    pub fn from_records(records: Vec<AqSolRecord>, subset: Split, ratio: f64) -> Result<Self> {
        let total = records.len();
        let kept: Vec<(String, f32)> = records
            .into_iter()
            .filter_map(|r| match r.log_s {
                Some(v) if v.is_finite() && v < AQSOL_OUTLIER_LOGS => Some((r.smiles, v)),
                _ => None,
            })
            .collect();

        if kept.len() < total {
            tracing::debug!(dropped = total - kept.len(), kept = kept.len(), "filtered AqueousSolu rows");
        }

        let labels: Vec<f32> = kept.iter().map(|(_, v)| *v).collect();
        let (min, max) = label_range(&labels).ok_or(DataError::EmptyDataset)?;

        let range = subset_range(kept.len(), subset, ratio)?;
        let (smiles, labels): (Vec<String>, Vec<f32>) = kept[range].iter().cloned().unzip();

        Ok(Self {
            subset,
            smiles,
            labels,
            min,
            max,
        })
    }

    /// Subset this dataset was built for.
    #[must_use]
    pub fn subset(&self) -> Split {
        self.subset
    }

    /// Number of molecules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.smiles.len()
    }

    /// Whether the subset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.smiles.is_empty()
    }

    /// SMILES strings.
    #[must_use]
    pub fn smiles(&self) -> &[String] {
        &self.smiles
    }

    /// logS labels.
    #[must_use]
    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    /// Smallest logS in the filtered file.
    #[must_use]
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Largest logS in the filtered file.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// SMILES and label at `index`.
    pub fn get(&self, index: usize) -> Result<(&str, f32)> {
        match (self.smiles.get(index), self.labels.get(index)) {
            (Some(smi), Some(&y)) => Ok((smi.as_str(), y)),
            _ => Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            }),
        }
    }
}

/// One row of the CombiSolu CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombiSoluRecord {
    /// Solute SMILES.
    pub solute_smiles: String,
    /// Solvent SMILES.
    pub solvent_smiles: String,
    /// Measurement temperature in K.
    #[serde(deserialize_with = "csv::invalid_option")]
    pub temperature: Option<f32>,
    /// Solvent density in kg/m3.
    #[serde(rename = "solvent_density [kg/m3]", deserialize_with = "csv::invalid_option")]
    pub solvent_density: Option<f32>,
    /// Experimental logS in mol/L.
    #[serde(rename = "experimental_logS [mol/L]", deserialize_with = "csv::invalid_option")]
    pub log_s: Option<f32>,
}

/// A complete CombiSolu sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombiSoluSample {
    /// Solute SMILES.
    pub solute_smiles: String,
    /// Solvent SMILES.
    pub solvent_smiles: String,
    /// Measurement temperature in K.
    pub temperature: f32,
    /// Solvent density in kg/m3.
    pub solvent_density: f32,
    /// logS, min-max scaled when the dataset scales labels.
    pub log_s: f32,
}

/// Solute/solvent solubility dataset.
#[derive(Debug, Clone)]
pub struct CombiSoluDataset {
    subset: Split,
    samples: Vec<CombiSoluSample>,
    min: f32,
    max: f32,
    scaler: Option<LabelScaler>,
}

impl CombiSoluDataset {
    /// Load `subset` from a CombiSolu CSV file.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        subset: Split,
        ratio: f64,
        scale_log_s: bool,
    ) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, subset, ratio, scale_log_s)
    }

    /// Load `subset` from any CSV source.
    pub fn from_reader<R: Read>(
        reader: R,
        subset: Split,
        ratio: f64,
        scale_log_s: bool,
    ) -> Result<Self> {
        Self::from_records(read_records(reader)?, subset, ratio, scale_log_s)
    }

    /// Build `subset` from parsed records.
    ///
    /// Rows missing temperature, solvent density or logS are dropped.
    pub fn from_records(
        records: Vec<CombiSoluRecord>,
        subset: Split,
        ratio: f64,
        scale_log_s: bool,
    ) -> Result<Self> {
        let total = records.len();
        let complete: Vec<CombiSoluSample> = records
            .into_iter()
            .filter_map(|r| match (r.temperature, r.solvent_density, r.log_s) {
                (Some(temperature), Some(solvent_density), Some(log_s))
                    if temperature.is_finite() && solvent_density.is_finite() && log_s.is_finite() =>
                {
                    Some(CombiSoluSample {
                        solute_smiles: r.solute_smiles,
                        solvent_smiles: r.solvent_smiles,
                        temperature,
                        solvent_density,
                        log_s,
                    })
                }
                _ => None,
            })
            .collect();

        if complete.len() < total {
            tracing::debug!(dropped = total - complete.len(), "dropped incomplete CombiSolu rows");
        }

        let labels: Vec<f32> = complete.iter().map(|s| s.log_s).collect();
        let (min, max) = label_range(&labels).ok_or(DataError::EmptyDataset)?;
        let scaler = if scale_log_s {
            Some(LabelScaler::new(min, max)?)
        } else {
            None
        };

        let range = subset_range(complete.len(), subset, ratio)?;
        let samples = complete[range]
            .iter()
            .cloned()
            .map(|mut s| {
                if let Some(scaler) = scaler {
                    s.log_s = scaler.scale(s.log_s);
                }
                s
            })
            .collect();

        Ok(Self {
            subset,
            samples,
            min,
            max,
            scaler,
        })
    }

    /// Subset this dataset was built for.
    #[must_use]
    pub fn subset(&self) -> Split {
        self.subset
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the subset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples.
    #[must_use]
    pub fn samples(&self) -> &[CombiSoluSample] {
        &self.samples
    }

    /// Sample at `index`.
    pub fn get(&self, index: usize) -> Result<&CombiSoluSample> {
        self.samples.get(index).ok_or(DataError::IndexOutOfBounds {
            index,
            length: self.samples.len(),
        })
    }

    /// Smallest unscaled logS in the file.
    #[must_use]
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Largest unscaled logS in the file.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Scaler applied to the labels, when scaling is enabled.
    #[must_use]
    pub fn scaler(&self) -> Option<LabelScaler> {
        self.scaler
    }

    /// Map a prediction in label space back to logS.
    #[must_use]
    pub fn unscale(&self, value: f32) -> f32 {
        self.scaler.map_or(value, |s| s.unscale(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AQSOL_CSV: &str = "\
smiles solute,logS_aq_avg,logS_aq_std,count
CCO,1.10,0.05,3
c1ccccc1,-1.64,0.10,5
CC(=O)O,1.20,,1
ClC(Cl)Cl,-1.17,0.30,2
O=C=O,6.40,0.00,1
CCCCCCCC,-5.24,0.15,4
CCN,nan,0.00,1
CCCl,-1.10,0.02,2
";

    const COMBI_CSV: &str = "\
solute_smiles,solvent_smiles,temperature,solvent_density [kg/m3],experimental_logS [mol/L]
CCO,O,298.15,997.0,-1.0
c1ccccc1,CCO,310.0,789.0,-3.0
CC(=O)O,O,,997.0,-2.0
ClC(Cl)Cl,CO,298.0,792.0,1.0
CCN,O,298.0,997.0,
";

    #[test]
    fn test_aqsol_drops_outliers_and_missing() {
        let ds = AqSolDataset::from_reader(AQSOL_CSV.as_bytes(), Split::Test, 0.9).unwrap();
        assert_eq!(ds.len(), 6);
        assert!(!ds.smiles().iter().any(|s| s == "O=C=O"));
        assert!(!ds.smiles().iter().any(|s| s == "CCN"));
        assert_eq!(ds.min(), -5.24);
        assert_eq!(ds.max(), 1.20);
    }

    #[test]
    fn test_aqsol_contiguous_partition() {
        let train = AqSolDataset::from_reader(AQSOL_CSV.as_bytes(), Split::Train, 0.5).unwrap();
        let valid = AqSolDataset::from_reader(AQSOL_CSV.as_bytes(), Split::Valid, 0.5).unwrap();

        assert_eq!(train.len(), 3);
        assert_eq!(valid.len(), 3);
        assert_eq!(train.get(0).unwrap(), ("CCO", 1.10));
        assert_eq!(valid.get(0).unwrap(), ("ClC(Cl)Cl", -1.17));
        assert_eq!(valid.subset(), Split::Valid);
        assert!(valid.get(3).is_err());
    }

    #[test]
    fn test_aqsol_optional_columns() {
        let csv = "smiles solute,logS_aq_avg\nCCO,0.5\nCCC,-1.5\n";
        let ds = AqSolDataset::from_reader(csv.as_bytes(), Split::Test, 0.9).unwrap();
        assert_eq!(ds.labels(), &[0.5, -1.5]);
    }

    #[test]
    fn test_aqsol_empty_after_filter() {
        let csv = "smiles solute,logS_aq_avg\nO=C=O,6.4\n";
        let err = AqSolDataset::from_reader(csv.as_bytes(), Split::Test, 0.9).unwrap_err();
        assert!(matches!(err, DataError::EmptyDataset));
    }

    #[test]
    fn test_combisolu_scaling() {
        let ds = CombiSoluDataset::from_reader(COMBI_CSV.as_bytes(), Split::Test, 0.9, true).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.min(), -3.0);
        assert_eq!(ds.max(), 1.0);

        let scaled: Vec<f32> = ds.samples().iter().map(|s| s.log_s).collect();
        assert_eq!(scaled, vec![0.5, 0.0, 1.0]);
        assert!((ds.unscale(0.5) - -1.0).abs() < 1e-6);
    }

    #[test]
    fn test_combisolu_unscaled() {
        let ds =
            CombiSoluDataset::from_reader(COMBI_CSV.as_bytes(), Split::Train, 0.7, false).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(ds.scaler().is_none());
        assert_eq!(ds.get(1).unwrap().solvent_smiles, "CCO");
        assert_eq!(ds.unscale(-3.0), -3.0);
    }

    #[test]
    fn test_label_scaler() {
        let scaler = LabelScaler::fit(&[-4.0, 0.0, 2.0]).unwrap();
        assert_eq!(scaler.scale(-4.0), 0.0);
        assert_eq!(scaler.scale(2.0), 1.0);
        assert!((scaler.unscale(scaler.scale(-1.3)) - -1.3).abs() < 1e-6);
        assert!(LabelScaler::new(1.0, 1.0).is_err());
        assert!(LabelScaler::fit(&[]).is_err());
    }
}
