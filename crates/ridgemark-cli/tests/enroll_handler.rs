use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use ridgemark_cli::cli::{EnrollArgs, OutputMode, StoreArgs};
use ridgemark_cli::commands::{CommandHandler, EnrollHandler};
use ridgemark_cli::errors::AppError;
use ridgemark_core::biometrics::{
    EnrollmentOutcome, EnrollmentStatistics, QualitySummary, RejectionCounts,
};

fn sample_args() -> EnrollArgs {
    EnrollArgs {
        subject: "alice".into(),
        name: Some("Alice".into()),
        seed: Some(4),
        capture_dir: None,
        store: StoreArgs {
            config: None,
            store_dir: Some(PathBuf::from("/var/lib/ridgemark")),
        },
    }
}

fn sample_outcome() -> EnrollmentOutcome {
    EnrollmentOutcome {
        subject_id: "alice".into(),
        display_name: "Alice".into(),
        profile_id: "c1a3".into(),
        statistics: EnrollmentStatistics {
            started_at: "2024-01-01T00:00:00.000Z".into(),
            finished_at: "2024-01-01T00:00:03.000Z".into(),
            attempts: 5,
            samples_accepted: 5,
            rejections: RejectionCounts::default(),
            quality: QualitySummary::from_scores(&[0.8, 0.85, 0.9, 0.82, 0.88]),
            total_capture_ms: 25,
            mean_minutiae_per_sample: 12.0,
            pooled_minutiae: 60,
            stable_minutiae: 11,
            feature_dimensions: 128,
        },
        samples: vec![],
        logs: vec!["Sample 1/5 accepted".into()],
    }
}

#[test]
fn enroll_handler_passes_verbose_flag_to_renderer() {
    let render_calls = Arc::new(Mutex::new(Vec::new()));
    let handler = EnrollHandler::with_dependencies(sample_args(), |_args| Ok(sample_outcome()), {
        let render_calls = Arc::clone(&render_calls);
        move |outcome, mode, verbose| {
            render_calls
                .lock()
                .unwrap()
                .push((outcome.subject_id.clone(), mode, verbose));
            Ok(())
        }
    });

    let exit = handler.execute(OutputMode::Json, true).unwrap();
    assert_eq!(exit, ExitCode::SUCCESS);
    let calls = render_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("alice".to_string(), OutputMode::Json, true));
}

#[test]
fn enroll_handler_hands_args_to_runner() {
    let seen = Arc::new(Mutex::new(None));
    let handler = EnrollHandler::with_dependencies(
        sample_args(),
        {
            let seen = Arc::clone(&seen);
            move |args: &EnrollArgs| {
                *seen.lock().unwrap() = Some((args.subject.clone(), args.seed));
                Ok(sample_outcome())
            }
        },
        |_outcome, _mode, _verbose| Ok(()),
    );

    handler.execute(OutputMode::Human, false).unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(("alice".to_string(), Some(4))));
}

#[test]
fn enroll_handler_surfaces_run_errors() {
    let handler = EnrollHandler::with_dependencies(
        sample_args(),
        |_args| {
            Err(AppError::InsufficientSamples {
                subject: "alice".into(),
                accepted: 3,
                required: 5,
                attempts: 25,
            })
        },
        |_outcome, _mode, _verbose| panic!("renderer must not run on failure"),
    );

    let err = handler.execute(OutputMode::Human, false).unwrap_err();
    match err {
        AppError::InsufficientSamples {
            accepted, required, ..
        } => assert_eq!((accepted, required), (3, 5)),
        other => panic!("unexpected error: {other}"),
    }
}
