use crate::error::{Result, SrcRecError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-space tessellation density, e.g. `oct6` or `ico5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Spacing {
    Oct(u8),
    Ico(u8),
    All,
}

impl Spacing {
    pub fn as_mne(&self) -> String {
        match self {
            Self::Oct(n) => format!("oct{}", n),
            Self::Ico(n) => format!("ico{}", n),
            Self::All => "all".to_string(),
        }
    }
}

impl TryFrom<String> for Spacing {
    type Error = SrcRecError;

    fn try_from(s: String) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "all" {
            return Ok(Self::All);
        }
        let parse = |digits: &str| {
            digits
                .parse::<u8>()
                .map_err(|_| SrcRecError::InvalidParameter(format!("Invalid spacing '{}'", s)))
        };
        if let Some(n) = s.strip_prefix("oct") {
            Ok(Self::Oct(parse(n)?))
        } else if let Some(n) = s.strip_prefix("ico") {
            Ok(Self::Ico(parse(n)?))
        } else {
            Err(SrcRecError::InvalidParameter(format!(
                "Invalid spacing '{}': expected octN, icoN or all",
                s
            )))
        }
    }
}

impl From<Spacing> for String {
    fn from(s: Spacing) -> Self {
        s.as_mne()
    }
}

impl fmt::Display for Spacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_mne())
    }
}

/// Whether inter-vertex distances are added to the source space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddDist {
    None,
    Patch,
    Full,
}

/// BEM conductivity profile in S/m.
///
/// One layer models the brain only; three layers are scalp, skull, brain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub enum Conductivity {
    SingleLayer(f64),
    ThreeLayer { scalp: f64, skull: f64, brain: f64 },
}

impl Conductivity {
    pub fn values(&self) -> Vec<f64> {
        match *self {
            Self::SingleLayer(brain) => vec![brain],
            Self::ThreeLayer { scalp, skull, brain } => vec![scalp, skull, brain],
        }
    }

    pub fn layers(&self) -> usize {
        match self {
            Self::SingleLayer(_) => 1,
            Self::ThreeLayer { .. } => 3,
        }
    }
}

impl Default for Conductivity {
    fn default() -> Self {
        Self::SingleLayer(0.3)
    }
}

impl TryFrom<Vec<f64>> for Conductivity {
    type Error = SrcRecError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        if let Some(v) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(SrcRecError::InvalidParameter(format!(
                "Conductivity values must be positive, got {}",
                v
            )));
        }
        match values.as_slice() {
            [brain] => Ok(Self::SingleLayer(*brain)),
            [scalp, skull, brain] => Ok(Self::ThreeLayer {
                scalp: *scalp,
                skull: *skull,
                brain: *brain,
            }),
            other => Err(SrcRecError::InvalidParameter(format!(
                "Conductivity needs 1 or 3 values, got {}",
                other.len()
            ))),
        }
    }
}

impl From<Conductivity> for Vec<f64> {
    fn from(c: Conductivity) -> Self {
        c.values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Mag,
    Grad,
    Eeg,
}

impl SensorType {
    pub fn as_mne(&self) -> &'static str {
        match self {
            Self::Mag => "mag",
            Self::Grad => "grad",
            Self::Eeg => "eeg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirDesign {
    Firwin,
    Firwin2,
}

impl FirDesign {
    pub fn as_mne(&self) -> &'static str {
        match self {
            Self::Firwin => "firwin",
            Self::Firwin2 => "firwin2",
        }
    }
}

/// Peak-to-peak rejection thresholds per channel type.
///
/// Units follow MNE: T for magnetometers, T/m for gradiometers, V for EEG/EOG.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RejectionThresholds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mag: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grad: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eeg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eog: Option<f64>,
}

impl RejectionThresholds {
    /// Amplitude policy applied when fitting ICA on continuous data.
    pub fn fixed_default() -> Self {
        Self {
            mag: Some(3000e-15),
            grad: Some(3000e-13),
            eeg: Some(100e-6),
            eog: Some(200e-6),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mag.is_none() && self.grad.is_none() && self.eeg.is_none() && self.eog.is_none()
    }
}

/// How bad data is kept out of the ICA fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionStrategy {
    /// Fit on continuous data with a fixed amplitude policy.
    FixedAmplitude { thresholds: RejectionThresholds },
    /// Epoch, estimate per-channel thresholds from the data, re-epoch, fit on epochs.
    Adaptive,
}

impl Default for RejectionStrategy {
    fn default() -> Self {
        Self::FixedAmplitude {
            thresholds: RejectionThresholds::fixed_default(),
        }
    }
}

impl RejectionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedAmplitude { .. } => "fixed",
            Self::Adaptive => "adaptive",
        }
    }
}

/// ICA component count: a fixed number or a fraction of explained variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IcaComponents {
    Count(usize),
    Variance(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IcaMethod {
    Fastica,
    Infomax,
    Picard,
}

impl IcaMethod {
    pub fn as_mne(&self) -> &'static str {
        match self {
            Self::Fastica => "fastica",
            Self::Infomax => "infomax",
            Self::Picard => "picard",
        }
    }
}

/// Inverse solution method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationMethod {
    #[serde(rename = "MNE")]
    Mne,
    #[serde(rename = "dSPM")]
    Dspm,
    #[serde(rename = "sLORETA")]
    SLoreta,
    #[serde(rename = "eLORETA")]
    ELoreta,
}

impl EstimationMethod {
    pub fn as_mne(&self) -> &'static str {
        match self {
            Self::Mne => "MNE",
            Self::Dspm => "dSPM",
            Self::SLoreta => "sLORETA",
            Self::ELoreta => "eLORETA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickOri {
    Normal,
    Vector,
}

impl PickOri {
    pub fn as_mne(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Vector => "vector",
        }
    }
}

/// Aggregation used to collapse a label's vertices into one time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    Mean,
    MeanFlip,
    PcaFlip,
    Max,
}

impl LabelMode {
    pub fn as_mne(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::MeanFlip => "mean_flip",
            Self::PcaFlip => "pca_flip",
            Self::Max => "max",
        }
    }
}
