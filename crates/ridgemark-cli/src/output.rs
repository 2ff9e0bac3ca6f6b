use std::error::Error;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::{json, Value};

use ridgemark_core::biometrics::{EnrollmentOutcome, ProfileRemovalOutcome, VerificationOutcome};
use ridgemark_core::errors::{AppError, AppResult};

use crate::cli::OutputMode;
use crate::commands::{ProfileListing, StatsOutcome};

fn write_json<T: Serialize + ?Sized>(payload: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

fn emit_logs(logs: &[String], verbose: bool) {
    if verbose {
        for line in logs {
            tracing::info!("{line}");
        }
    }
}

pub fn render_enroll(outcome: &EnrollmentOutcome, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            emit_logs(&outcome.logs, verbose);
            let stats = &outcome.statistics;
            println!(
                "Enrollment successful: profile {} stored for subject {} ({})",
                outcome.profile_id, outcome.subject_id, outcome.display_name
            );
            println!(
                "Samples: {} accepted after {} attempt(s); rejected {} (low quality {}, inconsistent {}, capture failures {})",
                stats.samples_accepted,
                stats.attempts,
                stats.rejections.total(),
                stats.rejections.low_quality,
                stats.rejections.inconsistent,
                stats.rejections.capture_unavailable
            );
            println!(
                "Quality: average {:.3}, min {:.3}, max {:.3}",
                stats.quality.average, stats.quality.min, stats.quality.max
            );
            println!(
                "Minutiae: {:.1} per sample, {} pooled, {} stable",
                stats.mean_minutiae_per_sample, stats.pooled_minutiae, stats.stable_minutiae
            );
        }
        OutputMode::Json => write_json(&enroll_json_payload(outcome))?,
    }
    Ok(())
}

fn enroll_json_payload(outcome: &EnrollmentOutcome) -> Value {
    json!({
        "success": true,
        "subject_id": outcome.subject_id,
        "display_name": outcome.display_name,
        "profile_id": outcome.profile_id,
        "statistics": outcome.statistics,
        "samples": outcome.samples,
    })
}

pub fn render_verify(
    outcome: &VerificationOutcome,
    mode: OutputMode,
    verbose: bool,
) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            emit_logs(&outcome.logs, verbose);
            match &outcome.subject_id {
                Some(subject) => println!(
                    "{}: subject {} (confidence {:.3})",
                    capitalize(outcome.message()),
                    subject,
                    outcome.confidence
                ),
                None => println!(
                    "{} (confidence {:.3})",
                    capitalize(outcome.message()),
                    outcome.confidence
                ),
            }
            if verbose {
                for score in &outcome.scores {
                    tracing::info!(
                        "{}: combined {:.3} (features {:.3}, minutiae {:.3})",
                        score.subject_id,
                        score.combined,
                        score.feature_similarity,
                        score.minutiae_similarity
                    );
                }
            }
        }
        OutputMode::Json => write_json(&verify_json_payload(outcome))?,
    }
    Ok(())
}

fn verify_json_payload(outcome: &VerificationOutcome) -> Value {
    json!({
        "subject_id": outcome.subject_id,
        "profile_id": outcome.log_entry.profile_id,
        "confidence": outcome.confidence,
        "decision": outcome.decision,
        "message": outcome.message(),
        "matched": outcome.decision.is_match(),
        "processing_ms": outcome.processing_time.as_secs_f64() * 1000.0,
        "scores": outcome.scores,
        "device_status": outcome.log_entry.device_status,
        "logged_at": outcome.log_entry.timestamp,
    })
}

pub fn render_remove(outcome: &ProfileRemovalOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &outcome.logs {
                println!("{line}");
            }
        }
        OutputMode::Json => write_json(&json!({
            "success": true,
            "subject_id": outcome.subject_id,
        }))?,
    }
    Ok(())
}

pub fn render_profiles(listing: &ProfileListing, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if listing.profiles.is_empty() {
                println!("No enrolled profiles in {}", listing.store_dir.display());
                return Ok(());
            }
            for profile in &listing.profiles {
                let last = profile.last_verified_at.as_deref().unwrap_or("never");
                println!(
                    "{} ({}): {} sample(s), {} stable minutiae, enrolled {}, verified {} time(s), last {}",
                    profile.subject_id,
                    profile.display_name,
                    profile.sample_count,
                    profile.stable_minutiae,
                    profile.created_at,
                    profile.verification_count,
                    last
                );
            }
        }
        OutputMode::Json => write_json(listing)?,
    }
    Ok(())
}

pub fn render_stats(outcome: &StatsOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            let stats = &outcome.statistics;
            println!("Store: {}", outcome.store_dir.display());
            println!(
                "Profiles: {} ({} samples)",
                stats.total_profiles, stats.total_samples
            );
            println!(
                "Verifications: {} total, {} successful ({:.1}%)",
                stats.total_verifications,
                stats.successful_verifications,
                stats.verification_success_rate
            );
            println!(
                "Sample quality: average {:.3}, min {:.3}, max {:.3}, std dev {:.3}",
                stats.quality.average, stats.quality.min, stats.quality.max, stats.quality.std_dev
            );
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "success": false,
                "kind": err.kind(),
                "error": err.human_message(),
            });
            if let Ok(json) = serde_json::to_string(&payload) {
                println!("{json}");
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
