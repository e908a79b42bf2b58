use srcrec_rs::bridge::{detect_python, BridgeScript, MneBridge};
use srcrec_rs::toolkit::Toolkit;
use srcrec_rs::SrcRecError;
use std::path::Path;

fn start_bridge() -> Option<MneBridge> {
    let env = match detect_python(None) {
        Some(env) if env.has_mne => env,
        _ => {
            eprintln!("Skipping test: no Python interpreter with MNE-Python found");
            return None;
        }
    };
    Some(MneBridge::start(&env, &BridgeScript::Embedded).expect("Failed to start MNE bridge"))
}

#[test]
fn test_bridge_starts_and_shuts_down() {
    let Some(bridge) = start_bridge() else {
        return;
    };
    assert!(bridge.mne_version().is_some());
    bridge.shutdown().expect("Bridge shutdown failed");
}

#[test]
fn test_bridge_reports_missing_recording() {
    let Some(mut bridge) = start_bridge() else {
        return;
    };
    let err = bridge
        .read_raw(Path::new("/nonexistent/srcrec/s01.fif"))
        .unwrap_err();
    assert!(
        matches!(
            err,
            SrcRecError::MissingInput { .. } | SrcRecError::MalformedInput(_)
        ),
        "unexpected error {:?}",
        err
    );
    assert!(bridge.last_traceback().is_some());

    // The session stays usable after a failed call.
    let err = bridge
        .read_source_space(Path::new("/nonexistent/srcrec/src.fif.gz"))
        .unwrap_err();
    assert!(!matches!(err, SrcRecError::Protocol(_)));
}
