use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use crate::study;
use serde::Serialize;
use srcrec_rs::subjects::resolve_subjects;
use srcrec_rs::{StudyConfig, SubjectPaths};
use std::path::PathBuf;

#[derive(Serialize)]
struct InputCheck {
    input: &'static str,
    path: PathBuf,
    exists: bool,
}

#[derive(Serialize)]
struct SubjectCheck {
    subject: String,
    anatomy: String,
    ready: bool,
    inputs: Vec<InputCheck>,
    output: PathBuf,
    output_exists: bool,
}

#[derive(Serialize)]
struct ValidateOutput {
    subjects: Vec<SubjectCheck>,
    ready: usize,
    total: usize,
}

fn check_subject(paths: &SubjectPaths) -> SubjectCheck {
    let inputs: Vec<InputCheck> = paths
        .inputs()
        .into_iter()
        .map(|(input, path)| InputCheck {
            input,
            path: path.to_path_buf(),
            exists: path.is_file(),
        })
        .collect();
    SubjectCheck {
        subject: paths.subject.clone(),
        anatomy: paths.anatomy.clone(),
        ready: inputs.iter().all(|i| i.exists),
        inputs,
        output: paths.output.clone(),
        output_exists: paths.output.exists(),
    }
}

fn check_study(config: &StudyConfig, subjects: &[String]) -> ValidateOutput {
    let checks: Vec<SubjectCheck> = subjects
        .iter()
        .map(|s| check_subject(&config.subject_paths(s)))
        .collect();
    ValidateOutput {
        ready: checks.iter().filter(|c| c.ready).count(),
        total: checks.len(),
        subjects: checks,
    }
}

pub fn execute(args: ValidateArgs) -> i32 {
    let config = match study::load_config(&args.study) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let subjects = match resolve_subjects(&config, args.subjects.as_deref(), args.discover) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };
    if subjects.is_empty() {
        eprintln!("Error: No subjects to validate");
        return exit_codes::INPUT_ERROR;
    }

    let result = check_study(&config, &subjects);

    if args.json {
        if let Err(e) = output::print_json(&result) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        for check in &result.subjects {
            if check.ready {
                println!("{}: ready -> {}", check.subject, check.output.display());
            } else {
                println!("{}: missing inputs", check.subject);
                for input in check.inputs.iter().filter(|i| !i.exists) {
                    println!("  {}: {}", input.input, input.path.display());
                }
            }
        }
        println!("{}/{} subject(s) ready", result.ready, result.total);
    }

    if result.ready == result.total {
        exit_codes::SUCCESS
    } else {
        exit_codes::INPUT_ERROR
    }
}
