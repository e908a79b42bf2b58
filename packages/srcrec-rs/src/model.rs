//! Head-model construction for one anatomy subject.
//!
//! Produces the two artifacts the pipeline later reads: a source space
//! (rewritten on every run) and a BEM solution (never overwritten).

use crate::config::StudyConfig;
use crate::error::{Result, SrcRecError};
use crate::toolkit::{SourceSpaceSummary, Toolkit};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelArtifacts {
    pub subject: String,
    pub source_space: PathBuf,
    pub bem_solution: PathBuf,
    pub summary: SourceSpaceSummary,
}

/// Build the source space and BEM solution for `subject`.
///
/// The source space is written before any BEM work starts, so a BEM failure
/// still leaves a usable source space behind. If the BEM solution file
/// already exists the build stops with [`SrcRecError::OutputExists`] and the
/// existing file is left untouched.
pub fn build_head_model<T: Toolkit + ?Sized>(
    tk: &mut T,
    config: &StudyConfig,
    subject: &str,
) -> Result<ModelArtifacts> {
    crate::profile_scope!(format!("head model {}", subject));
    let subjects_dir = &config.paths.subjects_dir;
    let model = &config.model;

    let anatomy = subjects_dir.join(subject);
    if !anatomy.is_dir() {
        return Err(SrcRecError::missing("anatomy directory", anatomy));
    }

    let bem_dir = config.bem_dir(subject);
    std::fs::create_dir_all(&bem_dir).map_err(|e| SrcRecError::output_write(&bem_dir, e))?;

    log::info!(
        "Setting up {} source space for {} (add_dist={:?})",
        model.spacing,
        subject,
        model.add_dist
    );
    let src = tk.setup_source_space(subject, subjects_dir, model.spacing, model.add_dist)?;
    let summary = tk.summarize_source_space(&src)?;
    log::info!("{}", summary);

    let source_space = config.source_space_path(subject);
    tk.write_source_space(&source_space, &src, true)?;
    log::info!("Wrote source space to {}", source_space.display());

    let bem_solution = config.bem_solution_path(subject);
    if bem_solution.exists() {
        return Err(SrcRecError::OutputExists(bem_solution));
    }

    log::info!("Running watershed on volume '{}'", model.watershed_volume);
    tk.make_watershed_bem(
        subject,
        subjects_dir,
        &model.watershed_volume,
        model.watershed_overwrite,
    )?;

    log::info!(
        "Building BEM model with conductivity {:?}",
        model.conductivity.values()
    );
    let bem = tk.make_bem_model(subject, subjects_dir, model.ico, &model.conductivity)?;
    let solution = tk.make_bem_solution(&bem)?;
    tk.write_bem_solution(&bem_solution, &solution, false)?;
    log::info!("Wrote BEM solution to {}", bem_solution.display());

    Ok(ModelArtifacts {
        subject: subject.to_string(),
        source_space,
        bem_solution,
        summary,
    })
}
