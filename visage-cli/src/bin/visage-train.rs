use std::{path::Path, process::ExitCode};

use log::LevelFilter;
use visage_cli::{
    args::TrainArgs,
    config::{apply_telemetry, apply_train_overrides, load_settings},
    exit::{TRAIN_FAILURE, parse_or_exit, report_failure},
    train::{completion_message, run_training},
};
use visage_utils::init_logging;

fn main() -> ExitCode {
    let args = match parse_or_exit::<TrainArgs>(TRAIN_FAILURE) {
        Ok(args) => args,
        Err(code) => return code,
    };
    if let Err(err) = init_logging(LevelFilter::Info) {
        eprintln!("failed to initialize logging: {err:#}");
    }

    let result = load_settings(args.common.config.as_ref()).and_then(|mut settings| {
        apply_train_overrides(&mut settings, &args);
        apply_telemetry(&settings);
        run_training(Path::new(&args.csv), &settings)
    });
    match result {
        Ok(report) => {
            println!("{}", completion_message(&report));
            ExitCode::SUCCESS
        }
        Err(err) => report_failure(&err, TRAIN_FAILURE),
    }
}
