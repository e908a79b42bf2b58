//! Per-subject cleaning and source reconstruction.
//!
//! [`SubjectPipeline::run`] walks one subject from raw recording to a saved
//! label time-course array. Each toolkit call is tagged with the
//! [`PipelineStep`] it belongs to so a failure reports where it happened.

use crate::config::{StudyConfig, SubjectPaths};
use crate::error::{Result, SrcRecError};
use crate::npy;
use crate::toolkit::*;
use crate::types::RejectionStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    OpenToolkit,
    CheckInputs,
    LoadRaw,
    Filter,
    FitIca,
    DetectArtifacts,
    ApplyIca,
    PickSensors,
    NoiseCovariance,
    Epoch,
    ForwardModel,
    InverseOperator,
    ApplyInverse,
    LabelTimeCourses,
    WriteOutput,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OpenToolkit => "starting toolkit",
            Self::CheckInputs => "checking inputs",
            Self::LoadRaw => "loading raw recording",
            Self::Filter => "high-pass filtering",
            Self::FitIca => "fitting ICA",
            Self::DetectArtifacts => "detecting ECG/EOG components",
            Self::ApplyIca => "applying ICA",
            Self::PickSensors => "selecting sensors",
            Self::NoiseCovariance => "computing noise covariance",
            Self::Epoch => "epoching",
            Self::ForwardModel => "computing forward solution",
            Self::InverseOperator => "computing inverse operator",
            Self::ApplyInverse => "applying inverse operator",
            Self::LabelTimeCourses => "extracting label time courses",
            Self::WriteOutput => "writing output",
        };
        f.write_str(name)
    }
}

/// An error together with the step that produced it.
#[derive(Debug)]
pub struct StepFailure {
    pub step: PipelineStep,
    pub error: SrcRecError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.error)
    }
}

impl std::error::Error for StepFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Attach a [`PipelineStep`] to a toolkit result.
pub trait AtStep<T> {
    fn at(self, step: PipelineStep) -> std::result::Result<T, StepFailure>;
}

impl<T> AtStep<T> for Result<T> {
    fn at(self, step: PipelineStep) -> std::result::Result<T, StepFailure> {
        self.map_err(|error| StepFailure { step, error })
    }
}

/// ICA components removed from a subject, by artifact source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExclusionSet {
    pub ecg: Vec<usize>,
    pub eog: Vec<usize>,
}

impl ExclusionSet {
    /// Keep the first `max_ecg` ECG and `max_eog` EOG candidates.
    ///
    /// Candidates arrive strongest first, so truncation keeps the best matches.
    pub fn capped(ecg: &[usize], eog: &[usize], max_ecg: usize, max_eog: usize) -> Self {
        Self {
            ecg: ecg.iter().copied().take(max_ecg).collect(),
            eog: eog.iter().copied().take(max_eog).collect(),
        }
    }

    /// Components to exclude, ECG first, each listed once.
    pub fn components(&self) -> Vec<usize> {
        let mut out: Vec<usize> = Vec::with_capacity(self.ecg.len() + self.eog.len());
        for &c in self.ecg.iter().chain(&self.eog) {
            if !out.contains(&c) {
                out.push(c);
            }
        }
        out
    }
}

/// Result of a successfully processed subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectOutput {
    pub subject: String,
    pub output: PathBuf,
    /// `(n_epochs, n_labels, n_times)`
    pub shape: [usize; 3],
    pub excluded: ExclusionSet,
}

pub struct SubjectPipeline<'a> {
    config: &'a StudyConfig,
}

impl<'a> SubjectPipeline<'a> {
    pub fn new(config: &'a StudyConfig) -> Self {
        Self { config }
    }

    pub fn run<T: Toolkit + ?Sized>(
        &self,
        tk: &mut T,
        paths: &SubjectPaths,
    ) -> std::result::Result<SubjectOutput, StepFailure> {
        use PipelineStep::*;
        let p = &self.config.pipeline;

        check_inputs(paths).at(CheckInputs)?;

        let raw = tk.read_raw(&paths.raw).at(LoadRaw)?;
        tk.filter_raw(&raw, p.filter.l_freq, p.filter.h_freq, p.filter.fir_design)
            .at(Filter)?;

        let picks = tk.pick_meg_channels(&raw, p.ica.exclude_bads).at(FitIca)?;
        let (ica, signal) = self.fit_ica(tk, &raw, &picks).at(FitIca)?;

        let excluded = self.detect_artifacts(tk, &ica, &raw, &picks).at(DetectArtifacts)?;
        log::info!(
            "{}: excluding ECG components {:?}, EOG components {:?}",
            paths.subject,
            excluded.ecg,
            excluded.eog
        );
        tk.apply_ica(&ica, &signal, &excluded.components())
            .at(ApplyIca)?;

        if let Signal::Continuous(raw) = signal {
            tk.crop(&raw, p.crop_tmin, None).at(PickSensors)?;
        }
        tk.pick_sensor_type(&signal, p.sensor_type).at(PickSensors)?;

        let cov = tk.make_ad_hoc_cov(&signal).at(NoiseCovariance)?;

        let epochs = match signal {
            Signal::Epoched(epochs) => epochs,
            Signal::Continuous(raw) => tk
                .make_fixed_length_epochs(&raw, p.epoch_duration, None)
                .at(Epoch)?,
        };

        let src = tk.read_source_space(&paths.source_space).at(ForwardModel)?;
        let fwd = tk
            .make_forward_solution(&epochs, &paths.trans, &src, &paths.bem_solution)
            .at(ForwardModel)?;
        let inv = tk
            .make_inverse_operator(&epochs, &fwd, &cov)
            .at(InverseOperator)?;

        let stcs = tk
            .apply_inverse_epochs(
                &epochs,
                &inv,
                p.inverse.lambda2(),
                p.inverse.method,
                p.inverse.pick_ori,
            )
            .at(ApplyInverse)?;

        let labels = tk
            .read_labels_from_annot(
                &paths.anatomy,
                &p.labels.parcellation,
                &self.config.paths.subjects_dir,
            )
            .at(LabelTimeCourses)?;
        let ltc = tk
            .extract_label_time_course(&stcs, &labels, &src, p.labels.mode)
            .at(LabelTimeCourses)?;
        if ltc.is_empty() {
            return Err(StepFailure {
                step: LabelTimeCourses,
                error: SrcRecError::MalformedInput(format!(
                    "Label time courses for {} are empty (shape {:?})",
                    paths.subject,
                    ltc.data.dim()
                )),
            });
        }

        save_label_time_courses(&paths.output, &ltc).at(WriteOutput)?;

        let (e, l, t) = ltc.data.dim();
        Ok(SubjectOutput {
            subject: paths.subject.clone(),
            output: paths.output.clone(),
            shape: [e, l, t],
            excluded,
        })
    }

    /// Fit ICA according to the rejection strategy; returns the fitted ICA
    /// and the signal it should be applied to.
    fn fit_ica<T: Toolkit + ?Sized>(
        &self,
        tk: &mut T,
        raw: &Handle<Raw>,
        picks: &[usize],
    ) -> Result<(Handle<Ica>, Signal)> {
        let p = &self.config.pipeline;
        let mut fit = IcaFit {
            n_components: p.ica.n_components,
            method: p.ica.method,
            decim: p.ica.decim,
            reject: None,
        };

        let signal = match &p.rejection {
            RejectionStrategy::FixedAmplitude { thresholds } => {
                fit.reject = (!thresholds.is_empty()).then_some(*thresholds);
                Signal::Continuous(*raw)
            }
            RejectionStrategy::Adaptive => {
                let probe = tk.make_fixed_length_epochs(raw, p.epoch_duration, None)?;
                let thresholds = tk.estimate_rejection_thresholds(&probe)?;
                log::info!("Estimated rejection thresholds: {:?}", thresholds);

                let reject = (!thresholds.is_empty()).then_some(&thresholds);
                let epochs = tk.make_fixed_length_epochs(raw, p.epoch_duration, reject)?;
                let kept = tk.count_epochs(&epochs)?;
                if kept == 0 {
                    return Err(SrcRecError::MalformedInput(
                        "Every epoch was rejected by the estimated thresholds".to_string(),
                    ));
                }
                log::debug!("{} epochs survive adaptive rejection", kept);
                Signal::Epoched(epochs)
            }
        };

        log::info!(
            "Fitting {} ICA on {} data",
            fit.method.as_mne(),
            signal.describe()
        );
        let ica = tk.fit_ica(&signal, picks, &fit)?;
        Ok((ica, signal))
    }

    fn detect_artifacts<T: Toolkit + ?Sized>(
        &self,
        tk: &mut T,
        ica: &Handle<Ica>,
        raw: &Handle<Raw>,
        picks: &[usize],
    ) -> Result<ExclusionSet> {
        let a = &self.config.pipeline.artifacts;
        let ecg_epochs = tk.create_ecg_epochs(raw, a.ecg_tmin, a.ecg_tmax, picks)?;
        let ecg = tk.find_bads_ecg(ica, &ecg_epochs, &a.ecg_method)?;
        let eog = tk.find_bads_eog(ica, raw)?;
        log::debug!("ECG candidates {:?}, EOG candidates {:?}", ecg, eog);
        Ok(ExclusionSet::capped(
            &ecg,
            &eog,
            a.max_ecg_components,
            a.max_eog_components,
        ))
    }
}

/// Fail with the first required input that does not exist.
pub fn check_inputs(paths: &SubjectPaths) -> Result<()> {
    match paths.missing_inputs().first() {
        Some((what, path)) => Err(SrcRecError::missing(*what, *path)),
        None => Ok(()),
    }
}

/// Write a label array as `.npy`, replacing any previous output.
pub fn save_label_time_courses(path: &Path, ltc: &LabelTimeCourses) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SrcRecError::output_write(parent, e))?;
    }
    if path.exists() {
        log::debug!("Overwriting {}", path.display());
    }
    npy::write_npy(path, &ltc.data)
}
