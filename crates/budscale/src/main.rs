//! budscale: bud dimension reports and image analysis from the command line.
//!
//! Works on a saved session document (the JSON a session persists after
//! every change) and, for analysis, the photo the regions were drawn on.
//!
//! # Usage
//!
//! ```text
//! budscale report session.json --width-cm 2 --height-cm 1 --out
//! budscale analyze buds.jpg session.json --endpoint http://localhost:3000/api/analyze
//! budscale regions session.json
//! ```

#![allow(clippy::print_stdout)]

mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use budscale_core::{Session, SessionDocument, SnapshotOutcome};
use budscale_export::{
    REPORT_FILE_NAME, ReportMetadata, analysis_to_markdown, report_to_markdown, to_markdown,
};
use budscale_io::{AnalysisGateway, BackoffConfig, ClientConfig, GatewayError};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

/// Bud dimension reports and remote image analysis.
#[derive(Parser)]
#[command(name = "budscale", version)]
struct Cli {
    /// Log filter used when `RUST_LOG` is not set (e.g. `debug`, `budscale_io=trace`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the dimension report for a saved session.
    Report(ReportArgs),
    /// Send the annotated image to the analysis service.
    Analyze(AnalyzeArgs),
    /// List the regions of a saved session.
    Regions {
        /// Session document (JSON).
        session: PathBuf,
    },
}

#[derive(Args)]
struct ReportArgs {
    /// Session document (JSON).
    session: PathBuf,

    /// Override the standard's declared width in centimetres.
    #[arg(long, requires = "height_cm")]
    width_cm: Option<f64>,

    /// Override the standard's declared height in centimetres.
    #[arg(long, requires = "width_cm")]
    height_cm: Option<f64>,

    /// Print the report as JSON instead of Markdown.
    #[arg(long)]
    json: bool,

    /// Also write the Markdown report to this file.
    ///
    /// Given without a path, writes `bud_dimension_analysis_report.md`
    /// in the working directory.
    #[arg(long, num_args = 0..=1, default_missing_value = REPORT_FILE_NAME)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Image the regions were drawn on (PNG, JPEG, BMP, WebP, GIF).
    image: PathBuf,

    /// Session document (JSON).
    session: PathBuf,

    /// Analysis endpoint URL.
    #[arg(long, env = "BUDSCALE_ENDPOINT", default_value = ClientConfig::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Total attempts, the first one included.
    #[arg(long, default_value_t = BackoffConfig::DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Wait before the second attempt in milliseconds; doubles after each retry.
    #[arg(long, default_value_t = BackoffConfig::DEFAULT_BASE_DELAY_MS, value_parser = clap::value_parser!(u64).range(1..))]
    base_delay_ms: u64,

    /// Upper bound on a single attempt in milliseconds (unbounded if omitted).
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Full client config as a JSON string.
    ///
    /// When provided, the endpoint and retry flags are ignored. The JSON
    /// must be a valid `ClientConfig` serialization; missing fields take
    /// their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Also write a Markdown document with the report (if a standard is
    /// set) and the analysis to this file.
    ///
    /// Given without a path, writes `bud_dimension_analysis_report.md`
    /// in the working directory.
    #[arg(long, num_args = 0..=1, default_missing_value = REPORT_FILE_NAME)]
    out: Option<PathBuf>,
}

/// Errors that end a command.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is not a valid session document: {source}")]
    Document {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("error parsing --config-json: {0}")]
    ConfigJson(serde_json::Error),

    #[error("failed to serialize report: {0}")]
    Serialize(serde_json::Error),

    #[error(transparent)]
    Calibration(#[from] budscale_core::CalibrationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}

fn read(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_owned(),
        source,
    })
}

fn write(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents).map_err(|source| CliError::Write {
        path: path.to_owned(),
        source,
    })?;
    info!(path = %path.display(), bytes = contents.len(), "written");
    Ok(())
}

/// Load a session document into a fresh session.
fn load_session(path: &Path) -> Result<Session, CliError> {
    let bytes = read(path)?;
    let document: SessionDocument =
        serde_json::from_slice(&bytes).map_err(|source| CliError::Document {
            path: path.to_owned(),
            source,
        })?;
    let mut session = Session::new(document.user_id.clone());
    // A fresh session has no open gesture, so the document always applies.
    let outcome = session.apply_snapshot(document);
    debug_assert_eq!(outcome, SnapshotOutcome::Applied);
    info!(
        path = %path.display(),
        regions = session.regions().len(),
        "session loaded"
    );
    Ok(session)
}

fn file_label(path: &Path) -> Option<&str> {
    path.file_name().and_then(|s| s.to_str())
}

/// Local time of an export, as written into the document header.
fn export_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S %:z").to_string()
}

fn report(args: &ReportArgs) -> Result<(), CliError> {
    let mut session = load_session(&args.session)?;
    if let (Some(w), Some(h)) = (args.width_cm, args.height_cm) {
        session.set_calibration(w, h)?;
    }
    let report = session.compute_report()?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).map_err(CliError::Serialize)?;
        println!("{json}");
    } else {
        print!("{}", report_to_markdown(&report));
    }

    if let Some(ref out) = args.out {
        let timestamp = export_timestamp();
        let metadata = ReportMetadata {
            source: file_label(&args.session),
            timestamp: Some(&timestamp),
        };
        if let Some(markdown) = to_markdown(Some(&report), None, &metadata) {
            write(out, &markdown)?;
        }
    }
    Ok(())
}

/// Build a [`ClientConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn client_config(args: &AnalyzeArgs) -> Result<ClientConfig, CliError> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(CliError::ConfigJson);
    }
    Ok(ClientConfig {
        endpoint: args.endpoint.clone(),
        backoff: BackoffConfig {
            max_attempts: args.max_attempts,
            base_delay_ms: args.base_delay_ms,
        },
        request_timeout_ms: args.request_timeout_ms,
    })
}

fn analyze(args: &AnalyzeArgs) -> Result<(), CliError> {
    let config = client_config(args)?;
    let gateway = AnalysisGateway::from_config(&config)?;
    let mut session = load_session(&args.session)?;
    let image = read(&args.image)?;

    info!(endpoint = %config.endpoint, "requesting analysis");
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    let text = runtime.block_on(gateway.request_analysis(
        &image,
        session.regions(),
        session.standard_id(),
        &session.calibration(),
    ))?;

    print!("{}", analysis_to_markdown(&text));

    if let Some(ref out) = args.out {
        let report = match session.compute_report() {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(reason = %e, "report omitted from document");
                None
            }
        };
        let timestamp = export_timestamp();
        let metadata = ReportMetadata {
            source: file_label(&args.image),
            timestamp: Some(&timestamp),
        };
        if let Some(markdown) = to_markdown(report.as_ref(), Some(&text), &metadata) {
            write(out, &markdown)?;
        }
    }
    Ok(())
}

fn regions(path: &Path) -> Result<(), CliError> {
    let session = load_session(path)?;
    let standard = session.standard_id();
    if session.regions().is_empty() {
        println!("no regions");
        return Ok(());
    }
    for region in session.regions() {
        let r = region.rect();
        let mark = if Some(region.id()) == standard {
            "  [standard]"
        } else {
            ""
        };
        println!(
            "{:<8} {:>6.0} x {:<6.0} px at ({:.0}, {:.0}){mark}",
            region.label(),
            r.w,
            r.h,
            r.x,
            r.y
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(&cli.log_level);

    let result = match &cli.command {
        Command::Report(args) => report(args),
        Command::Analyze(args) => analyze(args),
        Command::Regions { session } => regions(session),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "budscale",
            "analyze",
            "img.png",
            "s.json",
            "--max-attempts",
            "7",
            "--config-json",
            r#"{"endpoint":"http://example.test/analyze"}"#,
        ]);
        let Command::Analyze(args) = cli.command else {
            unreachable!("parsed a different subcommand");
        };
        let config = client_config(&args).unwrap();
        assert_eq!(config.endpoint, "http://example.test/analyze");
        assert_eq!(config.backoff.max_attempts, BackoffConfig::DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn flags_build_config() {
        let cli = Cli::parse_from([
            "budscale",
            "analyze",
            "img.png",
            "s.json",
            "--endpoint",
            "http://localhost:9/x",
            "--max-attempts",
            "5",
            "--base-delay-ms",
            "250",
        ]);
        let Command::Analyze(args) = cli.command else {
            unreachable!("parsed a different subcommand");
        };
        let config = client_config(&args).unwrap();
        assert_eq!(config.endpoint, "http://localhost:9/x");
        assert_eq!(config.backoff.max_attempts, 5);
        assert_eq!(config.backoff.base_delay_ms, 250);
        assert_eq!(config.request_timeout_ms, None);
    }

    #[test]
    fn calibration_flags_come_in_pairs() {
        assert!(
            Cli::try_parse_from(["budscale", "report", "s.json", "--width-cm", "2"]).is_err()
        );
    }

    #[test]
    fn bare_out_writes_default_file_name() {
        let cli = Cli::parse_from(["budscale", "report", "s.json", "--out"]);
        let Command::Report(args) = cli.command else {
            unreachable!("parsed a different subcommand");
        };
        assert_eq!(args.out, Some(PathBuf::from(REPORT_FILE_NAME)));

        let cli = Cli::parse_from(["budscale", "report", "s.json", "--out", "buds.md"]);
        let Command::Report(args) = cli.command else {
            unreachable!("parsed a different subcommand");
        };
        assert_eq!(args.out, Some(PathBuf::from("buds.md")));

        let cli = Cli::parse_from(["budscale", "analyze", "img.png", "s.json", "--out"]);
        let Command::Analyze(args) = cli.command else {
            unreachable!("parsed a different subcommand");
        };
        assert_eq!(args.out, Some(PathBuf::from(REPORT_FILE_NAME)));
    }

    #[test]
    fn report_export_is_stamped() {
        let dir = std::env::temp_dir().join(format!("budscale-cli-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let session = dir.join("session.json");
        std::fs::write(
            &session,
            r#"{
                "userId": "grower",
                "annotations": [
                    {"id": "lq9f3k2ab1x9", "x": 0, "y": 0, "w": 100, "h": 50},
                    {"id": "lq9f3m7cd2y0", "x": 200, "y": 0, "w": 200, "h": 100}
                ],
                "standardBudId": "lq9f3k2ab1x9",
                "standardWidthCm": 2,
                "standardHeightCm": 1
            }"#,
        )
        .unwrap();
        let out = dir.join(REPORT_FILE_NAME);
        let args = ReportArgs {
            session,
            width_cm: None,
            height_cm: None,
            json: true,
            out: Some(out.clone()),
        };

        report(&args).unwrap();
        let markdown = std::fs::read_to_string(&out).unwrap();
        assert!(markdown.contains("_Source: session.json_"));
        let stamp = markdown
            .lines()
            .find_map(|l| l.strip_prefix("_Exported: "))
            .unwrap()
            .trim_end()
            .trim_end_matches('_');
        assert!(chrono::DateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S %:z").is_ok());
        assert!(markdown.contains("| Bud B | 4.00 | 2.00 | **8.00** |"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_session_reports_bad_json() {
        let dir = std::env::temp_dir().join(format!("budscale-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_session(&path),
            Err(CliError::Document { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
