//! Fallwatch CLI - Command-line interface for the Fallwatch detector
//!
//! Commands:
//! - replay: Run recorded motion samples through the detector
//! - decode: Decode a radio record captured at the gateway
//! - profile: Print a sensitivity profile's thresholds
//! - doctor: Diagnose installation and configuration

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use fallwatch::classifier::DetectorState;
use fallwatch::posture::{Calibrator, DEFAULT_CALIBRATION_SAMPLES};
use fallwatch::{
    decode_packet, DetectorError, FallDetector, MotionSample, SensitivityProfile,
    SessionRecorder, FALLWATCH_VERSION, PRODUCER_NAME,
};

/// Fallwatch - Streaming fall and consciousness detection
#[derive(Parser)]
#[command(name = "fallwatch")]
#[command(version = FALLWATCH_VERSION)]
#[command(about = "Detect falls and post-fall immobility from 6-axis motion data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run NDJSON motion samples through the detector
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Sensitivity profile (conservative, balanced, sensitive)
        #[arg(short, long, default_value = "balanced")]
        profile: SensitivityProfile,

        /// Leading samples used for posture calibration (0 to skip)
        #[arg(long, default_value_t = DEFAULT_CALIBRATION_SAMPLES)]
        calibration_samples: usize,

        /// Only print ticks that change state or confirm a fall
        #[arg(long)]
        transitions_only: bool,

        /// Write a session report to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Decode a hex-encoded status (0x01) or fall (0x03) record
    Decode {
        /// Record bytes as hex, separators allowed
        hex: String,
    },

    /// Print the thresholds of a sensitivity profile
    Profile {
        /// Profile name or number
        name: SensitivityProfile,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose installation and configuration
    Doctor {
        /// Check a saved detector state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fallwatch=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FallwatchCliError> {
    match cli.command {
        Commands::Replay {
            input,
            profile,
            calibration_samples,
            transitions_only,
            summary,
        } => cmd_replay(
            &input,
            profile,
            calibration_samples,
            transitions_only,
            summary.as_deref(),
        ),
        Commands::Decode { hex } => cmd_decode(&hex),
        Commands::Profile { name, json } => cmd_profile(name, json),
        Commands::Doctor { state, json } => cmd_doctor(state.as_deref(), json),
    }
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>, FallwatchCliError> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(fs::File::open(path)?)))
    }
}

fn cmd_replay(
    input: &Path,
    profile: SensitivityProfile,
    calibration_samples: usize,
    transitions_only: bool,
    summary: Option<&Path>,
) -> Result<(), FallwatchCliError> {
    let reader = open_input(input)?;
    let mut detector = FallDetector::new(profile);
    let mut recorder = SessionRecorder::new(profile);
    let mut calibrator = (calibration_samples > 0).then(|| Calibrator::new(calibration_samples));
    let mut stdout = io::stdout().lock();
    let mut lines_read = 0usize;

    info!(%profile, calibration_samples, "replay started");

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines_read += 1;

        let sample: MotionSample = serde_json::from_str(trimmed).map_err(|e| {
            FallwatchCliError::ParseError(format!("line {}: {}", line_no + 1, e))
        })?;

        if let Some(cal) = calibrator.as_mut() {
            if let Some(calibration) = cal.push(&sample) {
                detector.calibrate(calibration);
                recorder.set_calibrated(true);
                calibrator = None;
            }
            continue;
        }

        let event = detector.process(&sample);
        let transition = recorder.record(&event);
        if !transitions_only || transition.is_some() || event.confirmed {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        }
    }
    stdout.flush()?;

    if let Some(cal) = calibrator {
        return Err(FallwatchCliError::Detector(
            DetectorError::InsufficientCalibration {
                required: calibration_samples,
                provided: cal.count(),
            },
        ));
    }
    if lines_read == 0 {
        return Err(FallwatchCliError::NoSamples);
    }

    let report = recorder.finish();
    info!(
        samples = report.samples_processed,
        falls = report.falls_confirmed,
        dangerous = report.dangerous_episodes,
        "replay finished"
    );

    if let Some(path) = summary {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        debug!(path = %path.display(), "session report written");
    }

    Ok(())
}

fn parse_hex(hex: &str) -> Result<Vec<u8>, FallwatchCliError> {
    let digits: String = hex
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '-' | '_'))
        .collect();
    if !digits.is_ascii() {
        return Err(FallwatchCliError::ParseError(
            "hex input contains non-ASCII characters".to_string(),
        ));
    }
    if digits.len() % 2 != 0 {
        return Err(FallwatchCliError::ParseError(
            "hex input has an odd number of digits".to_string(),
        ));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|e| {
                FallwatchCliError::ParseError(format!("invalid hex at offset {}: {}", i, e))
            })
        })
        .collect()
}

fn cmd_decode(hex: &str) -> Result<(), FallwatchCliError> {
    let bytes = parse_hex(hex)?;
    let packet = decode_packet(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&packet)?);
    Ok(())
}

fn cmd_profile(profile: SensitivityProfile, json: bool) -> Result<(), FallwatchCliError> {
    let thresholds = profile.thresholds();

    if json {
        println!("{}", serde_json::to_string_pretty(&thresholds)?);
        return Ok(());
    }

    let value = serde_json::to_value(&thresholds)?;
    println!("Profile: {}", profile);
    println!("==================");
    if let Some(fields) = value.as_object() {
        for (name, v) in fields {
            if name != "profile" {
                println!("  {:<34} {}", name, v);
            }
        }
    }
    Ok(())
}

fn cmd_doctor(state: Option<&Path>, json: bool) -> Result<(), FallwatchCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "fallwatch_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Fallwatch version {}", FALLWATCH_VERSION),
    });

    let presets: Vec<String> = SensitivityProfile::ALL
        .iter()
        .map(|p| p.to_string())
        .collect();
    checks.push(DoctorCheck {
        name: "profiles".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "Presets: {} (default {})",
            presets.join(", "),
            SensitivityProfile::default()
        ),
    });

    if let Some(state_path) = state {
        if state_path.exists() {
            match fs::read_to_string(state_path) {
                Ok(content) => match serde_json::from_str::<DetectorState>(&content) {
                    Ok(state) => {
                        checks.push(DoctorCheck {
                            name: "state".to_string(),
                            status: CheckStatus::Ok,
                            message: format!(
                                "State file valid ({}, {})",
                                state.activity,
                                if state.posture.is_calibrated() {
                                    "calibrated"
                                } else {
                                    "uncalibrated"
                                }
                            ),
                        });
                    }
                    Err(e) => {
                        checks.push(DoctorCheck {
                            name: "state".to_string(),
                            status: CheckStatus::Error,
                            message: format!("Invalid state JSON: {}", e),
                        });
                    }
                },
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "state".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Cannot read state file: {}", e),
                    });
                }
            }
        } else {
            checks.push(DoctorCheck {
                name: "state".to_string(),
                status: CheckStatus::Warning,
                message: "State file does not exist".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay from stdin ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FALLWATCH_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Fallwatch Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FallwatchCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum FallwatchCliError {
    Io(io::Error),
    Detector(DetectorError),
    Json(serde_json::Error),
    NoSamples,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for FallwatchCliError {
    fn from(e: io::Error) -> Self {
        FallwatchCliError::Io(e)
    }
}

impl From<DetectorError> for FallwatchCliError {
    fn from(e: DetectorError) -> Self {
        FallwatchCliError::Detector(e)
    }
}

impl From<serde_json::Error> for FallwatchCliError {
    fn from(e: serde_json::Error) -> Self {
        FallwatchCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FallwatchCliError> for CliError {
    fn from(e: FallwatchCliError) -> Self {
        match e {
            FallwatchCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FallwatchCliError::Detector(e) => {
                let hint = match &e {
                    DetectorError::InsufficientCalibration { .. } => {
                        "Provide more samples or lower --calibration-samples"
                    }
                    DetectorError::BufferTooShort { .. } | DetectorError::UnknownPacketType(_) => {
                        "Records are 10 bytes (type 0x01) or 45 bytes (type 0x03)"
                    }
                    _ => "Check input values",
                };
                CliError {
                    code: "DETECTOR_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            FallwatchCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FallwatchCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No motion samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FallwatchCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            FallwatchCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some(
                    "Each line must be {\"accel\":{..},\"gyro\":{..},\"timestamp_ms\":N}".to_string(),
                ),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
