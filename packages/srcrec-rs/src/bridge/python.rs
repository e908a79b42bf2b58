use crate::error::{Result, SrcRecError};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};

/// Environment variable naming the Python interpreter to use.
pub const PYTHON_ENV_VAR: &str = "SRCREC_PYTHON";

/// Interpreter names tried when nothing is configured.
pub const DEFAULT_PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

/// Detected Python environment with MNE availability info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonEnvironment {
    pub python_path: String,
    pub has_mne: bool,
    pub mne_version: Option<String>,
}

/// Find a Python interpreter.
///
/// Resolution order:
/// 1. Explicit path (if provided; no fallback when it does not work)
/// 2. `$SRCREC_PYTHON`
/// 3. `python3`, `python` on `$PATH`
///
/// Interpreters with MNE installed are preferred; if none has MNE the first
/// working interpreter is returned so callers can report what is missing.
pub fn detect_python(explicit: Option<&str>) -> Option<PythonEnvironment> {
    if let Some(path) = explicit {
        return probe_python(path);
    }

    let mut candidates: Vec<String> = Vec::new();
    if let Ok(env_path) = std::env::var(PYTHON_ENV_VAR) {
        if !env_path.trim().is_empty() {
            candidates.push(env_path);
        }
    }
    candidates.extend(DEFAULT_PYTHON_CANDIDATES.iter().map(|s| s.to_string()));

    let mut fallback = None;
    for candidate in &candidates {
        match probe_python(candidate) {
            Some(env) if env.has_mne => return Some(env),
            Some(env) => {
                if fallback.is_none() {
                    fallback = Some(env);
                }
            }
            None => {}
        }
    }
    fallback
}

/// Like [`detect_python`], but requires MNE to be importable.
pub fn require_mne(explicit: Option<&str>) -> Result<PythonEnvironment> {
    match detect_python(explicit) {
        Some(env) if env.has_mne => {
            log::info!(
                "Using {} (MNE {})",
                env.python_path,
                env.mne_version.as_deref().unwrap_or("unknown")
            );
            Ok(env)
        }
        Some(env) => Err(SrcRecError::ToolkitUnavailable(format!(
            "MNE-Python is not installed for {} (pip install mne)",
            env.python_path
        ))),
        None => Err(SrcRecError::ToolkitUnavailable(format!(
            "No Python interpreter found. Set ${} or pass --python",
            PYTHON_ENV_VAR
        ))),
    }
}

/// Probe a single Python executable for MNE availability.
fn probe_python(python_path: &str) -> Option<PythonEnvironment> {
    let output = Command::new(python_path)
        .args(["-c", "import mne; print(mne.__version__)"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;

    if output.status.success() {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        log::debug!("{} has MNE {}", python_path, version);
        return Some(PythonEnvironment {
            python_path: python_path.to_string(),
            has_mne: true,
            mne_version: Some(version),
        });
    }

    // MNE missing; check whether the interpreter itself works
    let py_check = Command::new(python_path)
        .args(["-c", "import sys; print(sys.version)"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .ok()?;

    if py_check.success() {
        log::debug!("{} works but cannot import mne", python_path);
        Some(PythonEnvironment {
            python_path: python_path.to_string(),
            has_mne: false,
            mne_version: None,
        })
    } else {
        None
    }
}
