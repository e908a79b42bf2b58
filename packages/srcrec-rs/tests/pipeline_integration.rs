mod common;

use common::{CallLog, FakeBehaviour, FakeToolkit, StudyFixture};
use srcrec_rs::npy::read_npy;
use srcrec_rs::toolkit::Signal;
use srcrec_rs::{
    run_batch, ErrorKind, PipelineStep, RejectionStrategy, SrcRecError, SubjectPipeline,
    SubjectStatus,
};
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

fn subjects(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Run a batch where every subject gets a fresh fake toolkit; returns the
/// report and the call log of each session.
fn run_fake(
    fixture: &StudyFixture,
    names: &[&str],
    behaviour: FakeBehaviour,
) -> (srcrec_rs::BatchReport, Vec<Rc<RefCell<CallLog>>>) {
    let mut logs = Vec::new();
    let report = run_batch(
        &fixture.config,
        &subjects(names),
        |_paths| {
            let tk = FakeToolkit::new(behaviour.clone());
            logs.push(tk.log.clone());
            Ok(tk)
        },
        &mut (),
    );
    (report, logs)
}

#[test]
fn test_batch_writes_label_array_per_subject() {
    let fixture = StudyFixture::new(&["s01", "s02"]);
    let (report, _) = run_fake(&fixture, &["s01", "s02"], FakeBehaviour::default());

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 0);
    for subject in ["s01", "s02"] {
        let array = read_npy(&fixture.output(subject)).unwrap();
        assert_eq!(array.shape(), &[4, 68, 11]);
        assert!(!array.is_empty());
    }
}

#[test]
fn test_failing_subject_does_not_stop_batch() {
    let fixture = StudyFixture::new(&["s01", "s02", "s03"]);
    fs::write(fixture.config.subject_paths("s02").raw, b"corrupt header").unwrap();

    let (report, _) = run_fake(&fixture, &["s01", "s02", "s03"], FakeBehaviour::default());

    assert_eq!(report.succeeded(), 2);
    assert!(fixture.output("s01").exists());
    assert!(!fixture.output("s02").exists());
    assert!(fixture.output("s03").exists());

    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].subject, "s02");
    match &failed[0].status {
        SubjectStatus::Failed { step, kind, .. } => {
            assert_eq!(*step, PipelineStep::LoadRaw);
            assert_eq!(*kind, ErrorKind::MalformedInput);
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[test]
fn test_missing_transform_fails_before_any_toolkit_call() {
    let fixture = StudyFixture::new(&["s01", "s02"]);
    fs::remove_file(fixture.config.subject_paths("s01").trans).unwrap();

    let (report, logs) = run_fake(&fixture, &["s01", "s02"], FakeBehaviour::default());

    assert!(!fixture.output("s01").exists());
    assert!(fixture.output("s02").exists());
    // only s02 opened a session
    assert_eq!(logs.len(), 1);
    match &report.subjects[0].status {
        SubjectStatus::Failed { step, kind, message, .. } => {
            assert_eq!(*step, PipelineStep::CheckInputs);
            assert_eq!(*kind, ErrorKind::MissingInput);
            assert!(message.contains("coordinate transform"));
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[test]
fn test_missing_bem_solution_reported_as_missing_input() {
    let fixture = StudyFixture::new(&["s01"]);
    fs::remove_file(fixture.config.subject_paths("s01").bem_solution).unwrap();

    let (report, _) = run_fake(&fixture, &["s01"], FakeBehaviour::default());
    match &report.subjects[0].status {
        SubjectStatus::Failed { kind, message, .. } => {
            assert_eq!(*kind, ErrorKind::MissingInput);
            assert!(message.contains("BEM solution"));
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(!fixture.output("s01").exists());
}

#[test]
fn test_rerun_overwrites_output() {
    let fixture = StudyFixture::new(&["s01"]);
    run_fake(&fixture, &["s01"], FakeBehaviour::default());
    assert_eq!(read_npy(&fixture.output("s01")).unwrap().shape(), &[4, 68, 11]);

    let behaviour = FakeBehaviour {
        n_epochs: 6,
        n_times: 5,
        ..FakeBehaviour::default()
    };
    let (report, _) = run_fake(&fixture, &["s01"], behaviour);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(read_npy(&fixture.output("s01")).unwrap().shape(), &[6, 68, 5]);
}

#[test]
fn test_component_caps_and_order() {
    let fixture = StudyFixture::new(&["s01"]);
    let behaviour = FakeBehaviour {
        ecg_candidates: vec![7, 2, 9, 4, 0],
        eog_candidates: vec![5, 6],
        ..FakeBehaviour::default()
    };
    let (report, logs) = run_fake(&fixture, &["s01"], behaviour);

    assert_eq!(logs[0].borrow().excluded, vec![7, 2, 9, 5]);
    match &report.subjects[0].status {
        SubjectStatus::Succeeded { excluded_components, .. } => {
            assert_eq!(excluded_components, &vec![7, 2, 9, 5]);
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[test]
fn test_no_artifact_components_found() {
    let fixture = StudyFixture::new(&["s01"]);
    let behaviour = FakeBehaviour {
        ecg_candidates: vec![],
        eog_candidates: vec![],
        ..FakeBehaviour::default()
    };
    let (report, logs) = run_fake(&fixture, &["s01"], behaviour);
    assert_eq!(report.succeeded(), 1);
    assert!(logs[0].borrow().excluded.is_empty());
}

#[test]
fn test_fixed_strategy_fits_on_continuous_data() {
    let fixture = StudyFixture::new(&["s01"]);
    let (_, logs) = run_fake(&fixture, &["s01"], FakeBehaviour::default());

    let log = logs[0].borrow();
    assert!(matches!(log.ica_signal, Some(Signal::Continuous(_))));
    let reject = log.ica_reject.expect("fixed thresholds passed to ICA");
    assert_eq!(reject.mag, Some(3000e-15));
    assert!(log.called("crop"));
    assert!(!log.called("estimate_rejection_thresholds"));
}

#[test]
fn test_adaptive_strategy_uses_estimated_thresholds() {
    let mut fixture = StudyFixture::new(&["s01"]);
    fixture.config.pipeline.rejection = RejectionStrategy::Adaptive;

    let (report, logs) = run_fake(&fixture, &["s01"], FakeBehaviour::default());
    assert_eq!(report.strategy, "adaptive");
    assert_eq!(report.succeeded(), 1);

    let log = logs[0].borrow();
    assert!(log.called("estimate_rejection_thresholds"));
    assert!(matches!(log.ica_signal, Some(Signal::Epoched(_))));
    assert!(log.ica_reject.is_none());
    assert!(!log.called("crop"));

    // Only the epochs surviving rejection reach the output.
    let array = read_npy(&fixture.output("s01")).unwrap();
    assert_eq!(array.shape()[0], 3);
}

#[test]
fn test_adaptive_strategy_with_every_epoch_rejected() {
    let mut fixture = StudyFixture::new(&["s01"]);
    fixture.config.pipeline.rejection = RejectionStrategy::Adaptive;
    let behaviour = FakeBehaviour {
        kept_epochs: 0,
        ..FakeBehaviour::default()
    };

    let (report, _) = run_fake(&fixture, &["s01"], behaviour);
    match &report.subjects[0].status {
        SubjectStatus::Failed { step, kind, .. } => {
            assert_eq!(*step, PipelineStep::FitIca);
            assert_eq!(*kind, ErrorKind::MalformedInput);
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(!fixture.output("s01").exists());
}

#[test]
fn test_numerical_failure_is_tagged_with_step() {
    let fixture = StudyFixture::new(&["s01", "s02"]);
    let behaviour = FakeBehaviour {
        fail_op: Some("make_inverse_operator"),
        ..FakeBehaviour::default()
    };
    let (report, _) = run_fake(&fixture, &["s01", "s02"], behaviour);

    assert_eq!(report.failed(), 2);
    for subject in &report.subjects {
        match &subject.status {
            SubjectStatus::Failed { step, kind, .. } => {
                assert_eq!(*step, PipelineStep::InverseOperator);
                assert_eq!(*kind, ErrorKind::NumericalFailure);
            }
            other => panic!("unexpected status {:?}", other),
        }
    }
}

#[test]
fn test_empty_label_array_is_not_written() {
    let fixture = StudyFixture::new(&["s01"]);
    let behaviour = FakeBehaviour {
        n_labels: 0,
        ..FakeBehaviour::default()
    };
    let (report, _) = run_fake(&fixture, &["s01"], behaviour);
    match &report.subjects[0].status {
        SubjectStatus::Failed { step, .. } => assert_eq!(*step, PipelineStep::LabelTimeCourses),
        other => panic!("unexpected status {:?}", other),
    }
    assert!(!fixture.output("s01").exists());
}

#[test]
fn test_toolkit_start_failure_recorded_per_subject() {
    let fixture = StudyFixture::new(&["s01", "s02"]);
    let mut attempts = 0;
    let report = run_batch(
        &fixture.config,
        &subjects(&["s01", "s02"]),
        |_paths| {
            attempts += 1;
            if attempts == 1 {
                Err(SrcRecError::ToolkitUnavailable("no interpreter".to_string()))
            } else {
                Ok(FakeToolkit::new(FakeBehaviour::default()))
            }
        },
        &mut (),
    );

    assert_eq!(attempts, 2);
    match &report.subjects[0].status {
        SubjectStatus::Failed { step, kind, .. } => {
            assert_eq!(*step, PipelineStep::OpenToolkit);
            assert_eq!(*kind, ErrorKind::ToolkitUnavailable);
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(report.subjects[1].succeeded());
}

#[test]
fn test_missing_input_reported_without_opening_toolkit() {
    let fixture = StudyFixture::new(&["s01", "s02"]);
    fs::remove_file(fixture.config.subject_paths("s01").raw).unwrap();
    let mut opened = Vec::new();
    let report = run_batch(
        &fixture.config,
        &subjects(&["s01", "s02"]),
        |paths| {
            opened.push(paths.subject.clone());
            Err::<FakeToolkit, _>(SrcRecError::ToolkitUnavailable("no interpreter".to_string()))
        },
        &mut (),
    );

    assert_eq!(opened, vec!["s02"]);
    match &report.subjects[0].status {
        SubjectStatus::Failed { step, kind, .. } => {
            assert_eq!(*step, PipelineStep::CheckInputs);
            assert_eq!(*kind, ErrorKind::MissingInput);
        }
        other => panic!("unexpected status {:?}", other),
    }
    match &report.subjects[1].status {
        SubjectStatus::Failed { step, .. } => assert_eq!(*step, PipelineStep::OpenToolkit),
        other => panic!("unexpected status {:?}", other),
    }
}

#[test]
fn test_template_anatomy_shared_by_subjects() {
    let mut fixture = StudyFixture::new(&["fsaverage"]);
    fixture.config.paths.anatomy_subject = Some("fsaverage".to_string());
    for subject in ["s01", "s02"] {
        let paths = fixture.config.subject_paths(subject);
        fs::write(&paths.raw, b"raw").unwrap();
        fs::write(&paths.trans, b"trans").unwrap();
    }

    let (report, _) = run_fake(&fixture, &["s01", "s02"], FakeBehaviour::default());
    assert_eq!(report.succeeded(), 2);
}

#[test]
fn test_single_subject_pipeline_reports_shape() {
    let fixture = StudyFixture::new(&["s01"]);
    let mut tk = FakeToolkit::new(FakeBehaviour::default());
    let paths = fixture.config.subject_paths("s01");

    let output = SubjectPipeline::new(&fixture.config)
        .run(&mut tk, &paths)
        .unwrap();
    assert_eq!(output.shape, [4, 68, 11]);
    assert_eq!(output.output, paths.output);
    assert_eq!(output.excluded.components(), vec![0, 3, 1]);
}

#[test]
fn test_report_serializes_status_inline() {
    let fixture = StudyFixture::new(&["s01"]);
    fs::write(fixture.config.subject_paths("s01").raw, b"corrupt").unwrap();
    let (report, _) = run_fake(&fixture, &["s01"], FakeBehaviour::default());

    let json = serde_json::to_value(&report).unwrap();
    let entry = &json["subjects"][0];
    assert_eq!(entry["subject"], "s01");
    assert_eq!(entry["status"], "failed");
    assert_eq!(entry["step"], "load_raw");
    assert_eq!(entry["kind"], "malformed_input");
    assert!(json["run_id"].is_string());
}
