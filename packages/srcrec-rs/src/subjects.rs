//! Subject list resolution and discovery.

use crate::config::{StudyConfig, SUBJECT_PLACEHOLDER};
use crate::error::{Result, SrcRecError};
use glob::Pattern;
use std::collections::HashSet;
use std::path::Path;

/// Drop empty and repeated identifiers, keeping first occurrences in order.
pub fn dedupe_subjects<S: AsRef<str>>(subjects: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(subjects.len());
    for subject in subjects {
        let subject = subject.as_ref().trim();
        if subject.is_empty() {
            continue;
        }
        if !seen.insert(subject.to_string()) {
            log::warn!("Subject '{}' listed more than once, processing it once", subject);
            continue;
        }
        out.push(subject.to_string());
    }
    out
}

fn split_pattern(pattern: &str) -> Result<(&str, &str)> {
    pattern.split_once(SUBJECT_PLACEHOLDER).ok_or_else(|| {
        SrcRecError::Config(format!(
            "File pattern '{}' must contain {}",
            pattern, SUBJECT_PLACEHOLDER
        ))
    })
}

/// Find subjects by matching recordings in `raw_dir` against `raw_pattern`.
///
/// Files that also match `trans_pattern` are skipped, so a transform stored
/// next to the recordings is not mistaken for a subject.
pub fn discover_subjects(raw_dir: &Path, raw_pattern: &str, trans_pattern: &str) -> Result<Vec<String>> {
    if !raw_dir.is_dir() {
        return Err(SrcRecError::missing("raw directory", raw_dir));
    }
    let (prefix, suffix) = split_pattern(raw_pattern)?;
    let (trans_prefix, trans_suffix) = split_pattern(trans_pattern)?;

    let glob_pattern = Path::new(&Pattern::escape(&raw_dir.to_string_lossy())).join(format!(
        "{}*{}",
        Pattern::escape(prefix),
        Pattern::escape(suffix)
    ));
    let glob_pattern = glob_pattern.to_string_lossy();
    let entries = glob::glob(&glob_pattern)
        .map_err(|e| SrcRecError::Config(format!("Invalid discovery pattern: {}", e)))?;

    let mut subjects = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if trans_prefix != prefix || trans_suffix != suffix {
            let is_trans = name.len() > trans_prefix.len() + trans_suffix.len()
                && name.starts_with(trans_prefix)
                && name.ends_with(trans_suffix);
            if is_trans {
                log::debug!("Skipping transform file {}", name);
                continue;
            }
        }
        let subject = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .unwrap_or_default();
        if !subject.is_empty() {
            subjects.push(subject.to_string());
        }
    }
    subjects.sort();
    subjects.dedup();
    log::info!("Discovered {} subject(s) in {}", subjects.len(), raw_dir.display());
    Ok(subjects)
}

/// Subjects to process: explicit list, then discovery, then the config file.
pub fn resolve_subjects(
    config: &StudyConfig,
    explicit: Option<&[String]>,
    discover: bool,
) -> Result<Vec<String>> {
    let subjects = match explicit {
        Some(list) if !list.is_empty() => dedupe_subjects(list),
        _ if discover => discover_subjects(
            &config.paths.raw_dir,
            &config.paths.files.raw,
            &config.paths.files.trans,
        )?,
        _ => dedupe_subjects(&config.subjects),
    };
    Ok(subjects)
}
