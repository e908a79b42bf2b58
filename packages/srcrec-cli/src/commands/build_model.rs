use crate::cli::BuildModelArgs;
use crate::exit_codes;
use crate::output;
use crate::study;
use srcrec_rs::{build_head_model, MneBridge};

pub fn execute(args: BuildModelArgs) -> i32 {
    let config = match study::load_config(&args.study) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let subject = match args
        .subject
        .clone()
        .or_else(|| config.paths.anatomy_subject.clone())
    {
        Some(s) => s,
        None => {
            eprintln!("Error: No subject given. Use --subject or set paths.anatomy_subject");
            return exit_codes::INPUT_ERROR;
        }
    };

    let (env, script) = match study::resolve_toolkit(&args.toolkit) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    let mut bridge = match MneBridge::start(&env, &script) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    let artifacts = match build_head_model(&mut bridge, &config, &subject) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error building head model for {}: {}", subject, e);
            return exit_codes::for_error(&e);
        }
    };

    if let Err(e) = bridge.shutdown() {
        log::warn!("Bridge shutdown failed: {}", e);
    }

    if args.json {
        if let Err(e) = output::print_json(&artifacts) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!("{}", artifacts.summary);
        println!("Source space: {}", artifacts.source_space.display());
        println!("BEM solution: {}", artifacts.bem_solution.display());
    }

    exit_codes::SUCCESS
}
