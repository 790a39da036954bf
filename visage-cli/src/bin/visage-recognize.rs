use std::{process::ExitCode, time::Duration};

use anyhow::Result;
use log::LevelFilter;
use visage_cli::{
    args::RecognizeArgs,
    config::{apply_recognize_overrides, apply_telemetry, load_settings},
    exit::{RECOGNIZE_FAILURE, parse_or_exit, report_failure},
    recognize::{HeadlessOptions, RecognitionSession, open_camera, run_headless},
    viewer::run_window,
};
use visage_utils::init_logging;

fn main() -> ExitCode {
    let args = match parse_or_exit::<RecognizeArgs>(RECOGNIZE_FAILURE) {
        Ok(args) => args,
        Err(code) => return code,
    };
    if let Err(err) = init_logging(LevelFilter::Info) {
        eprintln!("failed to initialize logging: {err:#}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err, RECOGNIZE_FAILURE),
    }
}

fn run(args: &RecognizeArgs) -> Result<()> {
    let mut settings = load_settings(args.common.config.as_ref())?;
    apply_recognize_overrides(&mut settings, args);
    apply_telemetry(&settings);

    let session = RecognitionSession::from_settings(
        &settings,
        args.common.eigen_threshold,
        args.common.fisher_threshold,
    )?;

    if args.headless {
        let mut camera = open_camera(&settings.webcam)?;
        let options = HeadlessOptions {
            frames: args.frames,
            annotate_dir: args.annotate.clone(),
            json: args.json.clone(),
            poll_interval: Duration::from_millis(settings.webcam.poll_interval_ms),
        };
        run_headless(&session, &mut camera, &options)?;
        camera.stop()?;
        Ok(())
    } else {
        run_window(session, settings.webcam)
    }
}
