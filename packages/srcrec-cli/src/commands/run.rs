use crate::cli::{RunArgs, StrategyArg};
use crate::exit_codes;
use crate::output;
use crate::study;
use srcrec_rs::subjects::resolve_subjects;
use srcrec_rs::{
    run_batch, BatchObserver, BatchReport, MneBridge, RejectionStrategy, SubjectReport,
    SubjectStatus,
};

/// Prints the per-subject result lines.
struct ConsoleProgress {
    quiet: bool,
}

impl BatchObserver for ConsoleProgress {
    fn subject_started(&mut self, index: usize, total: usize, subject: &str) {
        if !self.quiet {
            eprintln!("[{}/{}] {}...", index + 1, total, subject);
        }
    }

    fn subject_finished(&mut self, report: &SubjectReport) {
        match &report.status {
            SubjectStatus::Succeeded { .. } => {
                println!("Processing complete for {}", report.subject)
            }
            SubjectStatus::Failed { step, message, .. } => {
                println!(
                    "Error processing {}: {} failed: {}",
                    report.subject, step, message
                )
            }
        }
    }
}

pub fn execute(args: RunArgs) -> i32 {
    let mut config = match study::load_config(&args.study) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    match args.strategy {
        Some(StrategyArg::Fixed) => {
            if !matches!(config.pipeline.rejection, RejectionStrategy::FixedAmplitude { .. }) {
                config.pipeline.rejection = RejectionStrategy::default();
            }
        }
        Some(StrategyArg::Adaptive) => config.pipeline.rejection = RejectionStrategy::Adaptive,
        None => {}
    }
    if args.traceback {
        config.pipeline.log_traceback = true;
    }

    let subjects = match resolve_subjects(&config, args.subjects.as_deref(), args.discover) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };
    if subjects.is_empty() {
        eprintln!("Error: No subjects to process. Use --subjects, --discover or the config file");
        return exit_codes::INPUT_ERROR;
    }

    let (env, script) = match study::resolve_toolkit(&args.toolkit) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.paths.output_dir) {
        eprintln!(
            "Error: Failed to create output directory '{}': {}",
            config.paths.output_dir.display(),
            e
        );
        return exit_codes::EXECUTION_ERROR;
    }

    let mut progress = ConsoleProgress { quiet: args.quiet };
    let report = run_batch(
        &config,
        &subjects,
        |_paths| MneBridge::start(&env, &script),
        &mut progress,
    );

    if !args.quiet {
        let elapsed = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            report.succeeded(),
            report.total(),
            report.failed(),
            report.total(),
            elapsed
        );
    }

    if let Some(path) = &args.report {
        let written = output::to_json(&report).and_then(|json| output::write_output(&json, Some(path)));
        if let Err(e) = written {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    exit_code(&report, args.strict)
}

fn exit_code(report: &BatchReport, strict: bool) -> i32 {
    if !strict || report.failed() == 0 {
        exit_codes::SUCCESS
    } else if report.succeeded() > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use srcrec_rs::{ErrorKind, PipelineStep};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn report(outcomes: &[bool]) -> BatchReport {
        let subjects = outcomes
            .iter()
            .enumerate()
            .map(|(i, ok)| SubjectReport {
                subject: format!("s{:02}", i + 1),
                duration_secs: 1.0,
                status: if *ok {
                    SubjectStatus::Succeeded {
                        output: PathBuf::from("out.npy"),
                        shape: [1, 68, 10],
                        excluded_components: vec![],
                    }
                } else {
                    SubjectStatus::Failed {
                        step: PipelineStep::LoadRaw,
                        kind: ErrorKind::MissingInput,
                        message: "Missing raw recording".to_string(),
                        traceback: None,
                    }
                },
            })
            .collect();
        BatchReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            strategy: "fixed".to_string(),
            subjects,
        }
    }

    #[test]
    fn test_lenient_exit_code_ignores_failures() {
        assert_eq!(exit_code(&report(&[true, false]), false), exit_codes::SUCCESS);
        assert_eq!(exit_code(&report(&[false, false]), false), exit_codes::SUCCESS);
    }

    #[test]
    fn test_strict_exit_codes() {
        assert_eq!(exit_code(&report(&[true, true]), true), exit_codes::SUCCESS);
        assert_eq!(
            exit_code(&report(&[true, false]), true),
            exit_codes::PARTIAL_FAILURE
        );
        assert_eq!(
            exit_code(&report(&[false, false]), true),
            exit_codes::EXECUTION_ERROR
        );
    }
}
