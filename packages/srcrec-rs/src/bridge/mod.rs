//! MNE-Python backed [`Toolkit`].
//!
//! A [`MneBridge`] owns one Python child process running the bridge script.
//! Requests go to its stdin and responses come back on its stdout, one JSON
//! document per line. Objects created by the toolkit stay in the Python
//! process and are referred to by handle. Python's own stdout is redirected
//! to stderr inside the script, so library chatter never corrupts the
//! protocol stream.

pub mod protocol;
pub mod python;

pub use python::{detect_python, require_mne, PythonEnvironment};

use crate::error::{Result, SrcRecError};
use crate::toolkit::*;
use crate::types::*;
use protocol::{
    handle_from, indices_from, request_path, ArrayPayload, BridgeFailure, Request, Response,
};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Instant;

/// Bridge script compiled into the binary.
pub const EMBEDDED_BRIDGE_SCRIPT: &str = include_str!("../../resources/python/mne_bridge.py");

/// Where the bridge script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeScript {
    Embedded,
    File(PathBuf),
}

impl BridgeScript {
    pub fn from_override(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) if !path.is_file() => Err(SrcRecError::missing("bridge script", path)),
            Some(path) => Ok(Self::File(path)),
            None => Ok(Self::Embedded),
        }
    }
}

/// One running bridge process.
pub struct MneBridge {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    mne_version: Option<String>,
    last_traceback: Option<String>,
}

impl MneBridge {
    /// Spawn the bridge and wait for its ready message.
    pub fn start(env: &PythonEnvironment, script: &BridgeScript) -> Result<Self> {
        if !env.has_mne {
            return Err(SrcRecError::ToolkitUnavailable(format!(
                "MNE-Python not available for {}",
                env.python_path
            )));
        }

        let mut command = Command::new(&env.python_path);
        command.arg("-u");
        match script {
            BridgeScript::Embedded => command.arg("-c").arg(EMBEDDED_BRIDGE_SCRIPT),
            BridgeScript::File(path) => command.arg(path),
        };

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                SrcRecError::ToolkitUnavailable(format!(
                    "Failed to spawn Python process ({}): {}",
                    env.python_path, e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SrcRecError::Protocol("Bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| SrcRecError::Protocol("Bridge stdout unavailable".to_string()))?;

        let mut bridge = Self {
            child,
            stdin,
            stdout,
            next_id: 0,
            mne_version: None,
            last_traceback: None,
        };

        match bridge.read_response()? {
            Response::Ready { mne_version } => {
                log::debug!(
                    "MNE bridge ready (pid {}, MNE {})",
                    bridge.child.id(),
                    mne_version.as_deref().unwrap_or("unknown")
                );
                bridge.mne_version = mne_version;
                Ok(bridge)
            }
            Response::Error { error, .. } => Err(SrcRecError::ToolkitUnavailable(format!(
                "Bridge failed to start: {}",
                error
            ))),
            other => Err(SrcRecError::Protocol(format!(
                "Expected ready message, got {:?}",
                other
            ))),
        }
    }

    pub fn mne_version(&self) -> Option<&str> {
        self.mne_version.as_deref()
    }

    fn read_response(&mut self) -> Result<Response> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line)?;
        if n == 0 {
            let status = self
                .child
                .try_wait()
                .ok()
                .flatten()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "still running".to_string());
            return Err(SrcRecError::Protocol(format!(
                "Bridge closed its output unexpectedly ({})",
                status
            )));
        }
        serde_json::from_str(line.trim()).map_err(|e| {
            SrcRecError::Protocol(format!(
                "Failed to parse bridge response: {} (raw: {})",
                e,
                line.chars().take(200).collect::<String>()
            ))
        })
    }

    /// Send one operation and wait for its result.
    fn call(&mut self, op: &str, args: Value) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let fallback_path = request_path(&args);
        let request = Request { id, op, args };
        let mut payload = serde_json::to_string(&request)
            .map_err(|e| SrcRecError::Protocol(format!("Failed to serialize request: {}", e)))?;
        payload.push('\n');

        log::trace!("bridge <- {}", payload.trim_end());
        let started = Instant::now();
        self.stdin.write_all(payload.as_bytes())?;
        self.stdin.flush()?;

        let response = self.read_response()?;
        log::debug!("{} finished in {:.2}s", op, started.elapsed().as_secs_f64());

        match response {
            Response::Ok { id: rid, result } if rid == id => {
                if let Some(summary) = result.get("summary").and_then(Value::as_str) {
                    log::debug!("{}: {}", op, summary);
                }
                self.last_traceback = None;
                Ok(result)
            }
            Response::Ok { id: rid, .. } => Err(SrcRecError::Protocol(format!(
                "Response id {} does not match request id {}",
                rid, id
            ))),
            Response::Error {
                kind,
                error,
                path,
                traceback,
                ..
            } => {
                self.last_traceback = traceback.clone();
                Err(BridgeFailure {
                    kind,
                    error,
                    path: path.or(fallback_path),
                    traceback,
                }
                .into_error(op))
            }
            Response::Ready { .. } => Err(SrcRecError::Protocol(format!(
                "Unexpected ready message in reply to {}",
                op
            ))),
        }
    }

    fn call_handle<K>(&mut self, op: &str, args: Value) -> Result<Handle<K>> {
        let result = self.call(op, args)?;
        handle_from(op, &result)
    }

    /// Ask the bridge to exit and reap the process.
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        if let Err(e) = self.call("shutdown", json!({})) {
            log::warn!("Bridge did not shut down cleanly: {}", e);
            let _ = self.child.kill();
        }
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for MneBridge {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to stop bridge process: {}", e);
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn signal_arg(data: &Signal) -> Value {
    match data {
        Signal::Continuous(raw) => json!({"kind": "raw", "handle": raw.id()}),
        Signal::Epoched(epochs) => json!({"kind": "epochs", "handle": epochs.id()}),
    }
}

fn add_dist_arg(add_dist: AddDist) -> Value {
    match add_dist {
        AddDist::None => json!(false),
        AddDist::Patch => json!("patch"),
        AddDist::Full => json!(true),
    }
}

impl Toolkit for MneBridge {
    fn setup_source_space(
        &mut self,
        subject: &str,
        subjects_dir: &Path,
        spacing: Spacing,
        add_dist: AddDist,
    ) -> Result<Handle<SourceSpace>> {
        self.call_handle(
            "setup_source_space",
            json!({
                "subject": subject,
                "subjects_dir": path_arg(subjects_dir),
                "spacing": spacing.as_mne(),
                "add_dist": add_dist_arg(add_dist),
            }),
        )
    }

    fn summarize_source_space(&mut self, src: &Handle<SourceSpace>) -> Result<SourceSpaceSummary> {
        let result = self.call("summarize_source_space", json!({"handle": src.id()}))?;
        serde_json::from_value(result)
            .map_err(|e| SrcRecError::Protocol(format!("Bad source space summary: {}", e)))
    }

    fn write_source_space(
        &mut self,
        path: &Path,
        src: &Handle<SourceSpace>,
        overwrite: bool,
    ) -> Result<()> {
        self.call(
            "write_source_space",
            json!({"path": path_arg(path), "handle": src.id(), "overwrite": overwrite}),
        )
        .map(|_| ())
    }

    fn make_watershed_bem(
        &mut self,
        subject: &str,
        subjects_dir: &Path,
        volume: &str,
        overwrite: bool,
    ) -> Result<()> {
        self.call(
            "make_watershed_bem",
            json!({
                "subject": subject,
                "subjects_dir": path_arg(subjects_dir),
                "volume": volume,
                "overwrite": overwrite,
            }),
        )
        .map(|_| ())
    }

    fn make_bem_model(
        &mut self,
        subject: &str,
        subjects_dir: &Path,
        ico: Option<u8>,
        conductivity: &Conductivity,
    ) -> Result<Handle<BemModel>> {
        self.call_handle(
            "make_bem_model",
            json!({
                "subject": subject,
                "subjects_dir": path_arg(subjects_dir),
                "ico": ico,
                "conductivity": conductivity.values(),
            }),
        )
    }

    fn make_bem_solution(&mut self, model: &Handle<BemModel>) -> Result<Handle<BemSolution>> {
        self.call_handle("make_bem_solution", json!({"handle": model.id()}))
    }

    fn write_bem_solution(
        &mut self,
        path: &Path,
        solution: &Handle<BemSolution>,
        overwrite: bool,
    ) -> Result<()> {
        self.call(
            "write_bem_solution",
            json!({"path": path_arg(path), "handle": solution.id(), "overwrite": overwrite}),
        )
        .map(|_| ())
    }

    fn read_raw(&mut self, path: &Path) -> Result<Handle<Raw>> {
        self.call_handle("read_raw", json!({"path": path_arg(path)}))
    }

    fn filter_raw(
        &mut self,
        raw: &Handle<Raw>,
        l_freq: Option<f64>,
        h_freq: Option<f64>,
        fir_design: FirDesign,
    ) -> Result<()> {
        self.call(
            "filter_raw",
            json!({
                "handle": raw.id(),
                "l_freq": l_freq,
                "h_freq": h_freq,
                "fir_design": fir_design.as_mne(),
            }),
        )
        .map(|_| ())
    }

    fn pick_meg_channels(&mut self, raw: &Handle<Raw>, exclude_bads: bool) -> Result<Vec<usize>> {
        let result = self.call(
            "pick_meg_channels",
            json!({"handle": raw.id(), "exclude_bads": exclude_bads}),
        )?;
        indices_from("pick_meg_channels", &result)
    }

    fn make_fixed_length_epochs(
        &mut self,
        raw: &Handle<Raw>,
        duration: f64,
        reject: Option<&RejectionThresholds>,
    ) -> Result<Handle<Epochs>> {
        self.call_handle(
            "make_fixed_length_epochs",
            json!({"handle": raw.id(), "duration": duration, "reject": reject}),
        )
    }

    fn count_epochs(&mut self, epochs: &Handle<Epochs>) -> Result<usize> {
        let result = self.call("count_epochs", json!({"handle": epochs.id()}))?;
        result
            .get("count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| SrcRecError::Protocol("count_epochs returned no count".to_string()))
    }

    fn estimate_rejection_thresholds(
        &mut self,
        epochs: &Handle<Epochs>,
    ) -> Result<RejectionThresholds> {
        let result = self.call(
            "estimate_rejection_thresholds",
            json!({"handle": epochs.id()}),
        )?;
        serde_json::from_value(result)
            .map_err(|e| SrcRecError::Protocol(format!("Bad rejection thresholds: {}", e)))
    }

    fn fit_ica(&mut self, data: &Signal, picks: &[usize], fit: &IcaFit) -> Result<Handle<Ica>> {
        self.call_handle(
            "fit_ica",
            json!({
                "data": signal_arg(data),
                "picks": picks,
                "n_components": fit.n_components,
                "method": fit.method.as_mne(),
                "decim": fit.decim,
                "reject": fit.reject,
            }),
        )
    }

    fn create_ecg_epochs(
        &mut self,
        raw: &Handle<Raw>,
        tmin: f64,
        tmax: f64,
        picks: &[usize],
    ) -> Result<Handle<Epochs>> {
        self.call_handle(
            "create_ecg_epochs",
            json!({"handle": raw.id(), "tmin": tmin, "tmax": tmax, "picks": picks}),
        )
    }

    fn find_bads_ecg(
        &mut self,
        ica: &Handle<Ica>,
        ecg_epochs: &Handle<Epochs>,
        method: &str,
    ) -> Result<Vec<usize>> {
        let result = self.call(
            "find_bads_ecg",
            json!({"ica": ica.id(), "epochs": ecg_epochs.id(), "method": method}),
        )?;
        indices_from("find_bads_ecg", &result)
    }

    fn find_bads_eog(&mut self, ica: &Handle<Ica>, raw: &Handle<Raw>) -> Result<Vec<usize>> {
        let result = self.call("find_bads_eog", json!({"ica": ica.id(), "raw": raw.id()}))?;
        indices_from("find_bads_eog", &result)
    }

    fn apply_ica(&mut self, ica: &Handle<Ica>, data: &Signal, exclude: &[usize]) -> Result<()> {
        self.call(
            "apply_ica",
            json!({"ica": ica.id(), "data": signal_arg(data), "exclude": exclude}),
        )
        .map(|_| ())
    }

    fn crop(&mut self, raw: &Handle<Raw>, tmin: f64, tmax: Option<f64>) -> Result<()> {
        self.call(
            "crop",
            json!({"handle": raw.id(), "tmin": tmin, "tmax": tmax}),
        )
        .map(|_| ())
    }

    fn pick_sensor_type(&mut self, data: &Signal, sensor: SensorType) -> Result<()> {
        self.call(
            "pick_sensor_type",
            json!({"data": signal_arg(data), "sensor": sensor.as_mne()}),
        )
        .map(|_| ())
    }

    fn make_ad_hoc_cov(&mut self, data: &Signal) -> Result<Handle<Covariance>> {
        self.call_handle("make_ad_hoc_cov", json!({"data": signal_arg(data)}))
    }

    fn read_source_space(&mut self, path: &Path) -> Result<Handle<SourceSpace>> {
        self.call_handle("read_source_space", json!({"path": path_arg(path)}))
    }

    fn make_forward_solution(
        &mut self,
        epochs: &Handle<Epochs>,
        trans: &Path,
        src: &Handle<SourceSpace>,
        bem: &Path,
    ) -> Result<Handle<Forward>> {
        self.call_handle(
            "make_forward_solution",
            json!({
                "epochs": epochs.id(),
                "trans": path_arg(trans),
                "src": src.id(),
                "bem": path_arg(bem),
            }),
        )
    }

    fn make_inverse_operator(
        &mut self,
        epochs: &Handle<Epochs>,
        forward: &Handle<Forward>,
        cov: &Handle<Covariance>,
    ) -> Result<Handle<InverseOperator>> {
        self.call_handle(
            "make_inverse_operator",
            json!({"epochs": epochs.id(), "forward": forward.id(), "cov": cov.id()}),
        )
    }

    fn apply_inverse_epochs(
        &mut self,
        epochs: &Handle<Epochs>,
        inverse: &Handle<InverseOperator>,
        lambda2: f64,
        method: EstimationMethod,
        pick_ori: PickOri,
    ) -> Result<Handle<SourceEstimates>> {
        self.call_handle(
            "apply_inverse_epochs",
            json!({
                "epochs": epochs.id(),
                "inverse": inverse.id(),
                "lambda2": lambda2,
                "method": method.as_mne(),
                "pick_ori": pick_ori.as_mne(),
            }),
        )
    }

    fn read_labels_from_annot(
        &mut self,
        subject: &str,
        parcellation: &str,
        subjects_dir: &Path,
    ) -> Result<Handle<Labels>> {
        self.call_handle(
            "read_labels_from_annot",
            json!({
                "subject": subject,
                "parc": parcellation,
                "subjects_dir": path_arg(subjects_dir),
            }),
        )
    }

    fn extract_label_time_course(
        &mut self,
        stcs: &Handle<SourceEstimates>,
        labels: &Handle<Labels>,
        src: &Handle<SourceSpace>,
        mode: LabelMode,
    ) -> Result<LabelTimeCourses> {
        let result = self.call(
            "extract_label_time_course",
            json!({
                "stcs": stcs.id(),
                "labels": labels.id(),
                "src": src.id(),
                "mode": mode.as_mne(),
            }),
        )?;
        let payload: ArrayPayload = serde_json::from_value(result)
            .map_err(|e| SrcRecError::Protocol(format!("Bad label array payload: {}", e)))?;
        payload.decode()
    }

    fn last_traceback(&self) -> Option<&str> {
        self.last_traceback.as_deref()
    }
}
