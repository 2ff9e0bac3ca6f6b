use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "ridgemark",
    version,
    about = "Fingerprint enrollment and verification"
)]
pub struct Cli {
    /// Emit one JSON document instead of human readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Capture samples for a subject and store a biometric profile
    Enroll(EnrollArgs),
    /// Match one capture against every enrolled profile
    Verify(VerifyArgs),
    /// Delete a subject's profile; verification history is kept
    Remove(RemoveArgs),
    /// List enrolled profiles
    Profiles(StoreArgs),
    /// Summarise enrolled profiles and verification history
    Stats(StoreArgs),
}

/// Where settings and profiles come from. Shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// Configuration file (defaults to /etc/ridgemark/config.toml, then /usr/local/etc/ridgemark/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Profile store directory (overrides RIDGEMARK_STORE_DIR and the config file)
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct EnrollArgs {
    /// Subject identifier; also the profile file name
    pub subject: String,

    /// Display name stored with the profile (defaults to the subject id)
    #[arg(long)]
    pub name: Option<String>,

    /// Use the synthetic generator with this finger seed
    #[arg(long, conflicts_with = "capture_dir")]
    pub seed: Option<u64>,

    /// Read captures from image files dropped into this directory
    #[arg(long, value_name = "DIR")]
    pub capture_dir: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Verify this image file instead of capturing one
    #[arg(long, value_name = "PATH", conflicts_with_all = ["seed", "capture_dir"])]
    pub image: Option<PathBuf>,

    /// Use the synthetic generator with this finger seed
    #[arg(long, conflicts_with = "capture_dir")]
    pub seed: Option<u64>,

    /// Read the capture from an image file dropped into this directory
    #[arg(long, value_name = "DIR")]
    pub capture_dir: Option<PathBuf>,

    /// Exit with status 1 when the confidence is below this value
    #[arg(long, value_name = "SCORE", value_parser = parse_confidence)]
    pub min_confidence: Option<f64>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    pub subject: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

fn parse_confidence(value: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(format!("{parsed} is outside 0.0..=1.0"));
    }
    Ok(parsed)
}
