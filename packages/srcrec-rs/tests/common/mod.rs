//! In-memory toolkit and on-disk study layout shared by the integration tests.
#![allow(dead_code)]

use ndarray::Array3;
use srcrec_rs::toolkit::*;
use srcrec_rs::types::*;
use srcrec_rs::{Result, SrcRecError, StudyConfig};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Everything a [`FakeToolkit`] was asked to do.
#[derive(Debug, Default)]
pub struct CallLog {
    pub calls: Vec<String>,
    pub excluded: Vec<usize>,
    pub ica_signal: Option<Signal>,
    pub ica_reject: Option<RejectionThresholds>,
}

impl CallLog {
    pub fn called(&self, op: &str) -> bool {
        self.calls.iter().any(|c| c == op)
    }
}

/// Behaviour knobs for a [`FakeToolkit`].
#[derive(Debug, Clone)]
pub struct FakeBehaviour {
    pub ecg_candidates: Vec<usize>,
    pub eog_candidates: Vec<usize>,
    pub n_epochs: usize,
    /// Epochs surviving adaptive rejection.
    pub kept_epochs: usize,
    pub n_labels: usize,
    pub n_times: usize,
    /// Operation that fails with a numerical error.
    pub fail_op: Option<&'static str>,
}

impl Default for FakeBehaviour {
    fn default() -> Self {
        Self {
            ecg_candidates: vec![0, 3],
            eog_candidates: vec![1],
            n_epochs: 4,
            kept_epochs: 3,
            n_labels: 68,
            n_times: 11,
            fail_op: None,
        }
    }
}

pub struct FakeToolkit {
    pub behaviour: FakeBehaviour,
    pub log: Rc<RefCell<CallLog>>,
    next_id: u64,
    epoch_counts: HashMap<u64, usize>,
}

impl FakeToolkit {
    pub fn new(behaviour: FakeBehaviour) -> Self {
        Self {
            behaviour,
            log: Rc::new(RefCell::new(CallLog::default())),
            next_id: 0,
            epoch_counts: HashMap::new(),
        }
    }

    fn record(&mut self, op: &str) -> Result<()> {
        self.log.borrow_mut().calls.push(op.to_string());
        if self.behaviour.fail_op == Some(op) {
            return Err(SrcRecError::NumericalFailure(format!("{}: matrix is singular", op)));
        }
        Ok(())
    }

    fn handle<K>(&mut self) -> Handle<K> {
        self.next_id += 1;
        Handle::new(self.next_id)
    }

    fn read_file(&self, path: &Path, what: &str) -> Result<()> {
        let bytes = fs::read(path).map_err(|_| SrcRecError::missing(what, path))?;
        if bytes.starts_with(b"corrupt") {
            return Err(SrcRecError::MalformedInput(format!(
                "cannot parse {}",
                path.display()
            )));
        }
        Ok(())
    }

    fn epochs(&mut self, count: usize) -> Handle<Epochs> {
        let h: Handle<Epochs> = self.handle();
        self.epoch_counts.insert(h.id(), count);
        h
    }
}

impl Toolkit for FakeToolkit {
    fn setup_source_space(
        &mut self,
        subject: &str,
        subjects_dir: &Path,
        _spacing: Spacing,
        _add_dist: AddDist,
    ) -> Result<Handle<SourceSpace>> {
        self.record("setup_source_space")?;
        let surf = subjects_dir.join(subject).join("surf");
        if !surf.is_dir() {
            return Err(SrcRecError::missing("surfaces", surf));
        }
        Ok(self.handle())
    }

    fn summarize_source_space(&mut self, _src: &Handle<SourceSpace>) -> Result<SourceSpaceSummary> {
        self.record("summarize_source_space")?;
        Ok(SourceSpaceSummary {
            kind: "surface".to_string(),
            n_used: vec![4098, 4098],
            n_total: vec![155407, 156866],
        })
    }

    fn write_source_space(
        &mut self,
        path: &Path,
        _src: &Handle<SourceSpace>,
        overwrite: bool,
    ) -> Result<()> {
        self.record("write_source_space")?;
        if path.exists() && !overwrite {
            return Err(SrcRecError::OutputExists(path.to_path_buf()));
        }
        fs::write(path, b"source space").map_err(|e| SrcRecError::output_write(path, e))
    }

    fn make_watershed_bem(
        &mut self,
        _subject: &str,
        _subjects_dir: &Path,
        _volume: &str,
        _overwrite: bool,
    ) -> Result<()> {
        self.record("make_watershed_bem")
    }

    fn make_bem_model(
        &mut self,
        _subject: &str,
        _subjects_dir: &Path,
        _ico: Option<u8>,
        conductivity: &Conductivity,
    ) -> Result<Handle<BemModel>> {
        self.record("make_bem_model")?;
        assert!(matches!(conductivity.layers(), 1 | 3));
        Ok(self.handle())
    }

    fn make_bem_solution(&mut self, _model: &Handle<BemModel>) -> Result<Handle<BemSolution>> {
        self.record("make_bem_solution")?;
        Ok(self.handle())
    }

    fn write_bem_solution(
        &mut self,
        path: &Path,
        _solution: &Handle<BemSolution>,
        overwrite: bool,
    ) -> Result<()> {
        self.record("write_bem_solution")?;
        if path.exists() && !overwrite {
            return Err(SrcRecError::OutputExists(path.to_path_buf()));
        }
        fs::write(path, b"bem solution").map_err(|e| SrcRecError::output_write(path, e))
    }

    fn read_raw(&mut self, path: &Path) -> Result<Handle<Raw>> {
        self.record("read_raw")?;
        self.read_file(path, "raw recording")?;
        Ok(self.handle())
    }

    fn filter_raw(
        &mut self,
        _raw: &Handle<Raw>,
        _l_freq: Option<f64>,
        _h_freq: Option<f64>,
        _fir_design: FirDesign,
    ) -> Result<()> {
        self.record("filter_raw")
    }

    fn pick_meg_channels(&mut self, _raw: &Handle<Raw>, _exclude_bads: bool) -> Result<Vec<usize>> {
        self.record("pick_meg_channels")?;
        Ok((0..306).collect())
    }

    fn make_fixed_length_epochs(
        &mut self,
        _raw: &Handle<Raw>,
        _duration: f64,
        reject: Option<&RejectionThresholds>,
    ) -> Result<Handle<Epochs>> {
        self.record("make_fixed_length_epochs")?;
        let count = match reject {
            Some(_) => self.behaviour.kept_epochs,
            None => self.behaviour.n_epochs,
        };
        Ok(self.epochs(count))
    }

    fn count_epochs(&mut self, epochs: &Handle<Epochs>) -> Result<usize> {
        self.record("count_epochs")?;
        Ok(self.epoch_counts.get(&epochs.id()).copied().unwrap_or(0))
    }

    fn estimate_rejection_thresholds(
        &mut self,
        _epochs: &Handle<Epochs>,
    ) -> Result<RejectionThresholds> {
        self.record("estimate_rejection_thresholds")?;
        Ok(RejectionThresholds {
            mag: Some(2.5e-12),
            grad: Some(2.0e-10),
            eeg: None,
            eog: None,
        })
    }

    fn fit_ica(&mut self, data: &Signal, _picks: &[usize], fit: &IcaFit) -> Result<Handle<Ica>> {
        self.record("fit_ica")?;
        let mut log = self.log.borrow_mut();
        log.ica_signal = Some(*data);
        log.ica_reject = fit.reject;
        drop(log);
        Ok(self.handle())
    }

    fn create_ecg_epochs(
        &mut self,
        _raw: &Handle<Raw>,
        _tmin: f64,
        _tmax: f64,
        _picks: &[usize],
    ) -> Result<Handle<Epochs>> {
        self.record("create_ecg_epochs")?;
        Ok(self.epochs(40))
    }

    fn find_bads_ecg(
        &mut self,
        _ica: &Handle<Ica>,
        _ecg_epochs: &Handle<Epochs>,
        _method: &str,
    ) -> Result<Vec<usize>> {
        self.record("find_bads_ecg")?;
        Ok(self.behaviour.ecg_candidates.clone())
    }

    fn find_bads_eog(&mut self, _ica: &Handle<Ica>, _raw: &Handle<Raw>) -> Result<Vec<usize>> {
        self.record("find_bads_eog")?;
        Ok(self.behaviour.eog_candidates.clone())
    }

    fn apply_ica(&mut self, _ica: &Handle<Ica>, _data: &Signal, exclude: &[usize]) -> Result<()> {
        self.record("apply_ica")?;
        self.log.borrow_mut().excluded = exclude.to_vec();
        Ok(())
    }

    fn crop(&mut self, _raw: &Handle<Raw>, _tmin: f64, _tmax: Option<f64>) -> Result<()> {
        self.record("crop")
    }

    fn pick_sensor_type(&mut self, _data: &Signal, _sensor: SensorType) -> Result<()> {
        self.record("pick_sensor_type")
    }

    fn make_ad_hoc_cov(&mut self, _data: &Signal) -> Result<Handle<Covariance>> {
        self.record("make_ad_hoc_cov")?;
        Ok(self.handle())
    }

    fn read_source_space(&mut self, path: &Path) -> Result<Handle<SourceSpace>> {
        self.record("read_source_space")?;
        self.read_file(path, "source space")?;
        Ok(self.handle())
    }

    fn make_forward_solution(
        &mut self,
        _epochs: &Handle<Epochs>,
        trans: &Path,
        _src: &Handle<SourceSpace>,
        bem: &Path,
    ) -> Result<Handle<Forward>> {
        self.record("make_forward_solution")?;
        self.read_file(trans, "coordinate transform")?;
        self.read_file(bem, "BEM solution")?;
        Ok(self.handle())
    }

    fn make_inverse_operator(
        &mut self,
        _epochs: &Handle<Epochs>,
        _forward: &Handle<Forward>,
        _cov: &Handle<Covariance>,
    ) -> Result<Handle<InverseOperator>> {
        self.record("make_inverse_operator")?;
        Ok(self.handle())
    }

    fn apply_inverse_epochs(
        &mut self,
        epochs: &Handle<Epochs>,
        _inverse: &Handle<InverseOperator>,
        _lambda2: f64,
        _method: EstimationMethod,
        _pick_ori: PickOri,
    ) -> Result<Handle<SourceEstimates>> {
        self.record("apply_inverse_epochs")?;
        let count = self.epoch_counts.get(&epochs.id()).copied().unwrap_or(0);
        let h: Handle<SourceEstimates> = self.handle();
        self.epoch_counts.insert(h.id(), count);
        Ok(h)
    }

    fn read_labels_from_annot(
        &mut self,
        _subject: &str,
        _parcellation: &str,
        _subjects_dir: &Path,
    ) -> Result<Handle<Labels>> {
        self.record("read_labels_from_annot")?;
        Ok(self.handle())
    }

    fn extract_label_time_course(
        &mut self,
        stcs: &Handle<SourceEstimates>,
        _labels: &Handle<Labels>,
        _src: &Handle<SourceSpace>,
        _mode: LabelMode,
    ) -> Result<LabelTimeCourses> {
        self.record("extract_label_time_course")?;
        let n_epochs = self.epoch_counts.get(&stcs.id()).copied().unwrap_or(0);
        let (l, t) = (self.behaviour.n_labels, self.behaviour.n_times);
        let data = Array3::from_shape_fn((n_epochs, l, t), |(e, i, j)| {
            e as f64 + i as f64 * 0.01 + j as f64 * 1e-4
        });
        Ok(LabelTimeCourses {
            data,
            labels: (0..l).map(|i| format!("label-{}", i)).collect(),
        })
    }
}

/// A study directory with every input present for each subject.
pub struct StudyFixture {
    pub dir: TempDir,
    pub config: StudyConfig,
}

impl StudyFixture {
    pub fn new(subjects: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut config = StudyConfig::default();
        config.paths.subjects_dir = root.join("subjects");
        config.paths.raw_dir = root.join("raw");
        config.paths.trans_dir = root.join("trans");
        config.paths.output_dir = root.join("output");
        config.subjects = subjects.iter().map(|s| s.to_string()).collect();

        fs::create_dir_all(&config.paths.raw_dir).unwrap();
        fs::create_dir_all(&config.paths.trans_dir).unwrap();
        let fixture = Self { dir, config };
        for subject in subjects {
            fixture.add_subject(subject);
        }
        fixture
    }

    pub fn add_subject(&self, subject: &str) {
        let paths = self.config.subject_paths(subject);
        fs::create_dir_all(self.config.paths.subjects_dir.join(subject).join("surf")).unwrap();
        fs::create_dir_all(self.config.bem_dir(subject)).unwrap();
        fs::write(&paths.raw, b"raw").unwrap();
        fs::write(&paths.trans, b"trans").unwrap();
        fs::write(&paths.source_space, b"source space").unwrap();
        fs::write(&paths.bem_solution, b"bem solution").unwrap();
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn output(&self, subject: &str) -> PathBuf {
        self.config.subject_paths(subject).output
    }
}
