use crate::cli::ConfigArgs;
use crate::exit_codes;
use crate::output;
use crate::study;
use srcrec_rs::StudyConfig;

pub fn execute(args: ConfigArgs) -> i32 {
    let config = if args.defaults {
        StudyConfig::default()
    } else {
        match study::load_config(&args.study) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::INPUT_ERROR;
            }
        }
    };

    let json = match config.to_json_pretty() {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if let Err(e) = output::write_output(&json, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    if let Some(path) = &args.output {
        eprintln!("Configuration written to {}", path.display());
    }

    exit_codes::SUCCESS
}
