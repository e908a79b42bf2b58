use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use srcrec_rs::bridge::python::{DEFAULT_PYTHON_CANDIDATES, PYTHON_ENV_VAR};
use srcrec_rs::bridge::{detect_python, BridgeScript};
use srcrec_rs::config::LOCAL_CONFIG_FILE;
use srcrec_rs::StudyConfig;

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    python_path: Option<String>,
    python_found: bool,
    mne_found: bool,
    mne_version: Option<String>,
    bridge_script: String,
    config_file: Option<String>,
    platform: String,
    arch: String,
    search_order: Vec<String>,
}

pub fn execute(args: InfoArgs) -> i32 {
    let env = detect_python(args.toolkit.python.as_deref());
    let bridge_script = match BridgeScript::from_override(args.toolkit.bridge_script.clone()) {
        Ok(BridgeScript::Embedded) => "embedded".to_string(),
        Ok(BridgeScript::File(path)) => path.display().to_string(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut search_order = vec![format!("${}", PYTHON_ENV_VAR)];
    search_order.extend(DEFAULT_PYTHON_CANDIDATES.iter().map(|s| s.to_string()));

    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        python_path: env.as_ref().map(|e| e.python_path.clone()),
        python_found: env.is_some(),
        mne_found: env.as_ref().map(|e| e.has_mne).unwrap_or(false),
        mne_version: env.as_ref().and_then(|e| e.mne_version.clone()),
        bridge_script,
        config_file: StudyConfig::discover_path(None).map(|p| p.display().to_string()),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        search_order,
    };

    if args.json {
        if let Err(e) = output::print_json(&info) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!("srcrec CLI v{}", info.cli_version);
        println!("Platform: {} ({})", info.platform, info.arch);
        println!();
        match &info.python_path {
            Some(path) => println!("Python: {}", path),
            None => println!("Python: not found"),
        }
        match (&info.mne_version, info.mne_found) {
            (Some(v), true) => println!("MNE-Python: {}", v),
            (None, true) => println!("MNE-Python: installed"),
            _ => println!("MNE-Python: not found"),
        }
        println!("Bridge script: {}", info.bridge_script);
        println!(
            "Config file: {}",
            info.config_file
                .as_deref()
                .unwrap_or(&format!("none (looked for ./{})", LOCAL_CONFIG_FILE))
        );
        println!("Search order: --python, {}", info.search_order.join(", "));
    }

    exit_codes::SUCCESS
}
