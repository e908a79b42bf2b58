//! Sequential multi-subject runs with per-subject failure isolation.

use crate::config::{StudyConfig, SubjectPaths};
use crate::error::{ErrorKind, Result};
use crate::pipeline::{check_inputs, AtStep, PipelineStep, SubjectPipeline};
use crate::profiling::ProfileScope;
use crate::toolkit::Toolkit;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubjectStatus {
    Succeeded {
        output: PathBuf,
        shape: [usize; 3],
        excluded_components: Vec<usize>,
    },
    Failed {
        step: PipelineStep,
        kind: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        traceback: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectReport {
    pub subject: String,
    pub duration_secs: f64,
    #[serde(flatten)]
    pub status: SubjectStatus,
}

impl SubjectReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, SubjectStatus::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub strategy: String,
    pub subjects: Vec<SubjectReport>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.subjects.len()
    }

    pub fn succeeded(&self) -> usize {
        self.subjects.iter().filter(|s| s.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SubjectReport> {
        self.subjects.iter().filter(|s| !s.succeeded())
    }
}

/// Progress callbacks for a batch run.
pub trait BatchObserver {
    fn subject_started(&mut self, _index: usize, _total: usize, _subject: &str) {}
    fn subject_finished(&mut self, _report: &SubjectReport) {}
}

impl BatchObserver for () {}

/// Process `subjects` one after another.
///
/// `open_toolkit` is called once per subject, so every subject gets a fresh
/// session and dropping it releases everything the subject loaded. A failing
/// subject is logged and recorded; the remaining subjects still run.
pub fn run_batch<T, F, O>(
    config: &StudyConfig,
    subjects: &[String],
    mut open_toolkit: F,
    observer: &mut O,
) -> BatchReport
where
    T: Toolkit,
    F: FnMut(&SubjectPaths) -> Result<T>,
    O: BatchObserver + ?Sized,
{
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    let pipeline = SubjectPipeline::new(config);
    let total = subjects.len();
    log::info!("Batch {} started with {} subject(s)", run_id, total);

    let mut reports = Vec::with_capacity(total);
    for (i, subject) in subjects.iter().enumerate() {
        observer.subject_started(i, total, subject);
        let scope = ProfileScope::new(format!("subject {}", subject));
        let paths = config.subject_paths(subject);

        // Inputs are checked before a session is opened, so a subject with
        // missing files never starts the toolkit.
        let session = check_inputs(&paths)
            .at(PipelineStep::CheckInputs)
            .and_then(|()| open_toolkit(&paths).at(PipelineStep::OpenToolkit));

        let (outcome, traceback) = match session {
            Ok(mut tk) => {
                let outcome = pipeline.run(&mut tk, &paths);
                let traceback = match &outcome {
                    Err(_) => tk.last_traceback().map(str::to_string),
                    Ok(_) => None,
                };
                (outcome, traceback)
            }
            Err(failure) => (Err(failure), None),
        };

        let status = match outcome {
            Ok(output) => {
                log::info!("Processing complete for {}", subject);
                SubjectStatus::Succeeded {
                    output: output.output,
                    shape: output.shape,
                    excluded_components: output.excluded.components(),
                }
            }
            Err(failure) => {
                log::error!("Error processing {}: {}", subject, failure);
                let traceback = if config.pipeline.log_traceback {
                    if let Some(tb) = &traceback {
                        log::error!("Toolkit traceback for {}:\n{}", subject, tb);
                    }
                    traceback
                } else {
                    None
                };
                SubjectStatus::Failed {
                    step: failure.step,
                    kind: failure.error.kind(),
                    message: failure.error.to_string(),
                    traceback,
                }
            }
        };

        let report = SubjectReport {
            subject: subject.clone(),
            duration_secs: scope.elapsed().as_secs_f64(),
            status,
        };
        observer.subject_finished(&report);
        reports.push(report);
    }

    let report = BatchReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        strategy: config.pipeline.rejection.name().to_string(),
        subjects: reports,
    };
    log::info!(
        "Batch {} finished: {}/{} succeeded",
        report.run_id,
        report.succeeded(),
        report.total()
    );
    report
}
