//! Study configuration.
//!
//! Every tunable of the model builder and the subject pipeline lives in
//! [`StudyConfig`]. Defaults reproduce the reference analysis (0.1 Hz
//! high-pass, FastICA at 95 % variance, 3 ECG / 1 EOG components, 5 s epochs,
//! sLORETA at SNR 3, `aparc` labels with `mean_flip`). Any field may be
//! omitted from a JSON config file and falls back to its default.

use crate::error::{Result, SrcRecError};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the BEM solution, shared by the model builder and the pipeline.
pub const BEM_SOLUTION_FILE_NAME: &str = "bem-sol.fif";

/// File name of the compressed source space.
pub const SOURCE_SPACE_FILE_NAME: &str = "src.fif.gz";

/// Placeholder substituted with the subject identifier in file-name patterns.
pub const SUBJECT_PLACEHOLDER: &str = "{subject}";

/// Config file looked up in the working directory when `--config` is absent.
pub const LOCAL_CONFIG_FILE: &str = "srcrec.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StudyConfig {
    pub paths: PathsConfig,
    pub subjects: Vec<String>,
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// FreeSurfer subjects directory holding `<subject>/bem`.
    pub subjects_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub trans_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Use one anatomy (e.g. `fsaverage`) for every recording instead of the
    /// recording's own subject.
    pub anatomy_subject: Option<String>,
    pub files: FileNames,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            subjects_dir: PathBuf::from("subjects"),
            raw_dir: PathBuf::from("raw"),
            trans_dir: PathBuf::from("trans"),
            output_dir: PathBuf::from("output"),
            anatomy_subject: None,
            files: FileNames::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileNames {
    pub raw: String,
    pub trans: String,
    pub output: String,
    pub source_space: String,
    pub bem_solution: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            raw: "{subject}.fif".to_string(),
            trans: "{subject}-trans.fif".to_string(),
            output: "{subject}.npy".to_string(),
            source_space: SOURCE_SPACE_FILE_NAME.to_string(),
            bem_solution: BEM_SOLUTION_FILE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub spacing: Spacing,
    pub add_dist: AddDist,
    pub watershed_volume: String,
    pub watershed_overwrite: bool,
    /// Downsampling of the BEM surfaces; `None` keeps full resolution.
    pub ico: Option<u8>,
    pub conductivity: Conductivity,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            spacing: Spacing::Oct(6),
            add_dist: AddDist::Patch,
            watershed_volume: "T1".to_string(),
            watershed_overwrite: true,
            ico: Some(4),
            conductivity: Conductivity::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub ica: IcaConfig,
    pub rejection: RejectionStrategy,
    pub artifacts: ArtifactConfig,
    pub sensor_type: SensorType,
    /// Start of the retained segment after ICA, in seconds.
    pub crop_tmin: f64,
    /// Length of each fixed-length epoch in seconds.
    pub epoch_duration: f64,
    pub inverse: InverseConfig,
    pub labels: LabelConfig,
    /// Log the toolkit traceback alongside a subject failure.
    pub log_traceback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            ica: IcaConfig::default(),
            rejection: RejectionStrategy::default(),
            artifacts: ArtifactConfig::default(),
            sensor_type: SensorType::Mag,
            crop_tmin: 0.0,
            epoch_duration: 5.0,
            inverse: InverseConfig::default(),
            labels: LabelConfig::default(),
            log_traceback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub l_freq: Option<f64>,
    pub h_freq: Option<f64>,
    pub fir_design: FirDesign,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            l_freq: Some(0.1),
            h_freq: None,
            fir_design: FirDesign::Firwin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcaConfig {
    pub n_components: IcaComponents,
    pub method: IcaMethod,
    pub decim: Option<u32>,
    pub exclude_bads: bool,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self {
            n_components: IcaComponents::Variance(0.95),
            method: IcaMethod::Fastica,
            decim: Some(3),
            exclude_bads: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub ecg_tmin: f64,
    pub ecg_tmax: f64,
    pub ecg_method: String,
    pub max_ecg_components: usize,
    pub max_eog_components: usize,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            ecg_tmin: -0.5,
            ecg_tmax: 0.5,
            ecg_method: "ctps".to_string(),
            max_ecg_components: 3,
            max_eog_components: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InverseConfig {
    pub snr: f64,
    pub method: EstimationMethod,
    pub pick_ori: PickOri,
}

impl InverseConfig {
    /// Regularization parameter derived from the assumed SNR.
    pub fn lambda2(&self) -> f64 {
        1.0 / (self.snr * self.snr)
    }
}

impl Default for InverseConfig {
    fn default() -> Self {
        Self {
            snr: 3.0,
            method: EstimationMethod::SLoreta,
            pick_ori: PickOri::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub parcellation: String,
    pub mode: LabelMode,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            parcellation: "aparc".to_string(),
            mode: LabelMode::MeanFlip,
        }
    }
}

/// Resolved per-subject file locations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectPaths {
    pub subject: String,
    /// Subject whose anatomy (surfaces, labels, BEM) is used.
    pub anatomy: String,
    pub raw: PathBuf,
    pub trans: PathBuf,
    pub source_space: PathBuf,
    pub bem_solution: PathBuf,
    pub output: PathBuf,
}

impl SubjectPaths {
    /// Required inputs paired with a human-readable description.
    pub fn inputs(&self) -> [(&'static str, &Path); 4] {
        [
            ("raw recording", self.raw.as_path()),
            ("coordinate transform", self.trans.as_path()),
            ("source space", self.source_space.as_path()),
            ("BEM solution", self.bem_solution.as_path()),
        ]
    }

    pub fn missing_inputs(&self) -> Vec<(&'static str, &Path)> {
        self.inputs()
            .into_iter()
            .filter(|(_, path)| !path.is_file())
            .collect()
    }
}

/// Substitute the subject identifier into a file-name pattern.
pub fn expand_pattern(pattern: &str, subject: &str) -> String {
    pattern.replace(SUBJECT_PLACEHOLDER, subject)
}

impl StudyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SrcRecError::Config(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            SrcRecError::Config(format!("Cannot parse config '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Locate a config file: explicit path, `./srcrec.json`, then the user config dir.
    pub fn discover_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("srcrec").join("config.json"))
            .filter(|p| p.is_file())
    }

    /// Load the discovered config file, or fall back to defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match Self::discover_path(explicit) {
            Some(path) => Self::load(&path),
            None => {
                log::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SrcRecError::Config(format!("Cannot serialize config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        let files = &self.paths.files;
        for (name, pattern) in [
            ("raw", &files.raw),
            ("trans", &files.trans),
            ("output", &files.output),
        ] {
            if !pattern.contains(SUBJECT_PLACEHOLDER) {
                return Err(SrcRecError::Config(format!(
                    "File pattern '{}' ({}) must contain {}",
                    pattern, name, SUBJECT_PLACEHOLDER
                )));
            }
        }
        if files.source_space.is_empty() || files.bem_solution.is_empty() {
            return Err(SrcRecError::Config(
                "Source space and BEM solution file names must not be empty".to_string(),
            ));
        }

        let p = &self.pipeline;
        if let Some(l_freq) = p.filter.l_freq {
            if !(l_freq > 0.0) {
                return Err(SrcRecError::Config(format!(
                    "High-pass cutoff must be positive, got {}",
                    l_freq
                )));
            }
        }
        if let (Some(l), Some(h)) = (p.filter.l_freq, p.filter.h_freq) {
            if h <= l {
                return Err(SrcRecError::Config(format!(
                    "Low-pass cutoff ({}) must exceed high-pass cutoff ({})",
                    h, l
                )));
            }
        }
        match p.ica.n_components {
            IcaComponents::Variance(v) if !(v > 0.0 && v <= 1.0) => {
                return Err(SrcRecError::Config(format!(
                    "ICA variance fraction must be in (0, 1], got {}",
                    v
                )));
            }
            IcaComponents::Count(0) => {
                return Err(SrcRecError::Config(
                    "ICA component count must be greater than 0".to_string(),
                ));
            }
            _ => {}
        }
        if p.artifacts.ecg_tmin >= p.artifacts.ecg_tmax {
            return Err(SrcRecError::Config(format!(
                "ECG window start ({}) must precede its end ({})",
                p.artifacts.ecg_tmin, p.artifacts.ecg_tmax
            )));
        }
        if !(p.epoch_duration > 0.0) {
            return Err(SrcRecError::Config(format!(
                "Epoch duration must be positive, got {}",
                p.epoch_duration
            )));
        }
        if !(p.inverse.snr > 0.0) {
            return Err(SrcRecError::Config(format!(
                "SNR must be positive, got {}",
                p.inverse.snr
            )));
        }
        if p.labels.parcellation.trim().is_empty() {
            return Err(SrcRecError::Config("Parcellation name is empty".to_string()));
        }
        Ok(())
    }

    /// Directory holding the source space and BEM solution of an anatomy.
    pub fn bem_dir(&self, anatomy: &str) -> PathBuf {
        self.paths.subjects_dir.join(anatomy).join("bem")
    }

    pub fn source_space_path(&self, anatomy: &str) -> PathBuf {
        self.bem_dir(anatomy).join(&self.paths.files.source_space)
    }

    pub fn bem_solution_path(&self, anatomy: &str) -> PathBuf {
        self.bem_dir(anatomy).join(&self.paths.files.bem_solution)
    }

    pub fn subject_paths(&self, subject: &str) -> SubjectPaths {
        let anatomy = self
            .paths
            .anatomy_subject
            .clone()
            .unwrap_or_else(|| subject.to_string());
        let files = &self.paths.files;
        SubjectPaths {
            subject: subject.to_string(),
            raw: self.paths.raw_dir.join(expand_pattern(&files.raw, subject)),
            trans: self.paths.trans_dir.join(expand_pattern(&files.trans, subject)),
            source_space: self.source_space_path(&anatomy),
            bem_solution: self.bem_solution_path(&anatomy),
            output: self.paths.output_dir.join(expand_pattern(&files.output, subject)),
            anatomy,
        }
    }
}
