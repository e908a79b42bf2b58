//! Configuration and toolkit resolution shared by the subcommands.

use crate::cli::{StudyArgs, ToolkitArgs};
use srcrec_rs::bridge::require_mne;
use srcrec_rs::{BridgeScript, PythonEnvironment, Result, StudyConfig};

/// Load the study configuration and apply command-line overrides.
pub fn load_config(args: &StudyArgs) -> Result<StudyConfig> {
    let mut config = StudyConfig::load_or_default(args.config.as_deref())?;
    apply_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut StudyConfig, args: &StudyArgs) {
    let paths = &mut config.paths;
    if let Some(dir) = &args.subjects_dir {
        paths.subjects_dir = dir.clone();
    }
    if let Some(dir) = &args.raw_dir {
        paths.raw_dir = dir.clone();
    }
    if let Some(dir) = &args.trans_dir {
        paths.trans_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        paths.output_dir = dir.clone();
    }
    if let Some(subject) = &args.anatomy_subject {
        paths.anatomy_subject = Some(subject.clone());
    }
}

/// Locate a Python interpreter with MNE and the bridge script to run in it.
pub fn resolve_toolkit(args: &ToolkitArgs) -> Result<(PythonEnvironment, BridgeScript)> {
    let script = BridgeScript::from_override(args.bridge_script.clone())?;
    let env = require_mne(args.python.as_deref())?;
    Ok((env, script))
}
