//! Interface to the external neuroimaging toolkit.
//!
//! The orchestration code never touches numerics: every stage is a call on a
//! [`Toolkit`], and every intermediate object stays inside the toolkit behind
//! a typed [`Handle`]. Only the final label time courses come back as data.

pub mod handle;

pub use handle::{
    BemModel, BemSolution, Covariance, Epochs, Forward, Handle, Ica, InverseOperator, Kind,
    Labels, Raw, SourceEstimates, SourceSpace,
};

use crate::error::Result;
use crate::types::*;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sensor data at some stage of cleaning: continuous or already epoched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continuous(Handle<Raw>),
    Epoched(Handle<Epochs>),
}

impl Signal {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Continuous(_) => "continuous",
            Self::Epoched(_) => "epoched",
        }
    }
}

/// Parameters of an ICA fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcaFit {
    pub n_components: IcaComponents,
    pub method: IcaMethod,
    pub decim: Option<u32>,
    pub reject: Option<RejectionThresholds>,
}

/// Summary of a source space, one entry per hemisphere.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceSpaceSummary {
    pub kind: String,
    pub n_used: Vec<usize>,
    pub n_total: Vec<usize>,
}

impl std::fmt::Display for SourceSpaceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<SourceSpaces: [")?;
        for (i, (used, total)) in self.n_used.iter().zip(&self.n_total).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "<{}, n_vertices={}, n_used={}>", self.kind, total, used)?;
        }
        write!(f, "]>")
    }
}

/// Per-epoch, per-label source time courses.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTimeCourses {
    /// Shape `(n_epochs, n_labels, n_times)`.
    pub data: Array3<f64>,
    pub labels: Vec<String>,
}

impl LabelTimeCourses {
    pub fn n_epochs(&self) -> usize {
        self.data.dim().0
    }

    pub fn n_labels(&self) -> usize {
        self.data.dim().1
    }

    pub fn n_times(&self) -> usize {
        self.data.dim().2
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Operations of the external toolkit used by the model builder and the
/// subject pipeline.
///
/// Implementations hold all intermediate objects. In-place operations mutate
/// the object behind the handle they are given.
pub trait Toolkit {
    // --- head model ---------------------------------------------------------

    fn setup_source_space(
        &mut self,
        subject: &str,
        subjects_dir: &Path,
        spacing: Spacing,
        add_dist: AddDist,
    ) -> Result<Handle<SourceSpace>>;

    fn summarize_source_space(&mut self, src: &Handle<SourceSpace>) -> Result<SourceSpaceSummary>;

    fn write_source_space(
        &mut self,
        path: &Path,
        src: &Handle<SourceSpace>,
        overwrite: bool,
    ) -> Result<()>;

    fn make_watershed_bem(
        &mut self,
        subject: &str,
        subjects_dir: &Path,
        volume: &str,
        overwrite: bool,
    ) -> Result<()>;

    fn make_bem_model(
        &mut self,
        subject: &str,
        subjects_dir: &Path,
        ico: Option<u8>,
        conductivity: &Conductivity,
    ) -> Result<Handle<BemModel>>;

    fn make_bem_solution(&mut self, model: &Handle<BemModel>) -> Result<Handle<BemSolution>>;

    fn write_bem_solution(
        &mut self,
        path: &Path,
        solution: &Handle<BemSolution>,
        overwrite: bool,
    ) -> Result<()>;

    // --- sensor-space cleaning ----------------------------------------------

    fn read_raw(&mut self, path: &Path) -> Result<Handle<Raw>>;

    fn filter_raw(
        &mut self,
        raw: &Handle<Raw>,
        l_freq: Option<f64>,
        h_freq: Option<f64>,
        fir_design: FirDesign,
    ) -> Result<()>;

    /// Indices of MEG channels, optionally excluding channels marked bad.
    fn pick_meg_channels(&mut self, raw: &Handle<Raw>, exclude_bads: bool) -> Result<Vec<usize>>;

    fn make_fixed_length_epochs(
        &mut self,
        raw: &Handle<Raw>,
        duration: f64,
        reject: Option<&RejectionThresholds>,
    ) -> Result<Handle<Epochs>>;

    fn count_epochs(&mut self, epochs: &Handle<Epochs>) -> Result<usize>;

    /// Data-driven per-channel-type rejection thresholds.
    fn estimate_rejection_thresholds(
        &mut self,
        epochs: &Handle<Epochs>,
    ) -> Result<RejectionThresholds>;

    fn fit_ica(&mut self, data: &Signal, picks: &[usize], fit: &IcaFit) -> Result<Handle<Ica>>;

    fn create_ecg_epochs(
        &mut self,
        raw: &Handle<Raw>,
        tmin: f64,
        tmax: f64,
        picks: &[usize],
    ) -> Result<Handle<Epochs>>;

    /// ECG-correlated components, strongest first.
    fn find_bads_ecg(
        &mut self,
        ica: &Handle<Ica>,
        ecg_epochs: &Handle<Epochs>,
        method: &str,
    ) -> Result<Vec<usize>>;

    /// EOG-correlated components, strongest first.
    fn find_bads_eog(&mut self, ica: &Handle<Ica>, raw: &Handle<Raw>) -> Result<Vec<usize>>;

    fn apply_ica(&mut self, ica: &Handle<Ica>, data: &Signal, exclude: &[usize]) -> Result<()>;

    fn crop(&mut self, raw: &Handle<Raw>, tmin: f64, tmax: Option<f64>) -> Result<()>;

    fn pick_sensor_type(&mut self, data: &Signal, sensor: SensorType) -> Result<()>;

    fn make_ad_hoc_cov(&mut self, data: &Signal) -> Result<Handle<Covariance>>;

    // --- source space -------------------------------------------------------

    fn read_source_space(&mut self, path: &Path) -> Result<Handle<SourceSpace>>;

    fn make_forward_solution(
        &mut self,
        epochs: &Handle<Epochs>,
        trans: &Path,
        src: &Handle<SourceSpace>,
        bem: &Path,
    ) -> Result<Handle<Forward>>;

    fn make_inverse_operator(
        &mut self,
        epochs: &Handle<Epochs>,
        forward: &Handle<Forward>,
        cov: &Handle<Covariance>,
    ) -> Result<Handle<InverseOperator>>;

    fn apply_inverse_epochs(
        &mut self,
        epochs: &Handle<Epochs>,
        inverse: &Handle<InverseOperator>,
        lambda2: f64,
        method: EstimationMethod,
        pick_ori: PickOri,
    ) -> Result<Handle<SourceEstimates>>;

    fn read_labels_from_annot(
        &mut self,
        subject: &str,
        parcellation: &str,
        subjects_dir: &Path,
    ) -> Result<Handle<Labels>>;

    fn extract_label_time_course(
        &mut self,
        stcs: &Handle<SourceEstimates>,
        labels: &Handle<Labels>,
        src: &Handle<SourceSpace>,
        mode: LabelMode,
    ) -> Result<LabelTimeCourses>;

    /// Toolkit-side traceback of the most recent failed call, if any.
    fn last_traceback(&self) -> Option<&str> {
        None
    }
}
