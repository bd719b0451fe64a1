// Perfgate CLI - performance analysis and CI build gate for load-test snapshots
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

// Macro for conditional printing based on quiet flag
macro_rules! qprintln {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            println!($($arg)*);
        }
    };
}

use perfgate::{
    emit_events, init_logging_with_default, init_logging_with_level, log_error_with_context,
    AnalysisConfig, BuildDecision, OperationContext, PerformanceAnalyzer, ScoreSource,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Perfgate - performance regression, capacity and scalability analysis",
    long_about = None,
    after_help = "QUICK START:
  1. Write a config:          perfgate init-config perfgate.toml
  2. Analyze a snapshot:      perfgate analyze results.json
  3. Gate a build:            perfgate gate results.json

EXAMPLES:
  # Full report written to disk, failing the job on a bad result
  perfgate analyze results.json --output report.json --enforce

  # CI build variant gated on the metric score
  perfgate gate results.json --performance-score"
)]
struct Cli {
    /// Enable verbose logging (DEBUG level). Default is WARN level.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors and the machine-readable result
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file (TOML); falls back to PERFGATE_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a metrics snapshot and print the full report
    Analyze {
        /// Snapshot JSON file
        snapshot: PathBuf,
        /// Write the report JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Exit with status 1 when the build gate fails
        #[arg(long)]
        enforce: bool,
    },

    /// Evaluate the CI build gate and print the decision
    Gate {
        /// Snapshot JSON file
        snapshot: PathBuf,
        /// Gate on the metric-level performance score instead of the overall score
        #[arg(long)]
        performance_score: bool,
    },

    /// Show the effective baseline registry
    Baselines,

    /// Write the default configuration as TOML
    InitConfig {
        /// Output file; prints to stdout when omitted
        file: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let mut config = match path {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AnalysisConfig::load().context("Failed to load configuration")?,
    };
    if path.is_some() {
        config.apply_env_overrides()?;
        config.validate()?;
    }
    Ok(config)
}

fn read_snapshot(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))
}

fn print_decision(decision: &BuildDecision, quiet: bool) -> Result<()> {
    qprintln!(quiet, "{}", decision.reason);
    for detail in &decision.details {
        qprintln!(quiet, "  - {}", detail);
    }
    println!("{}", serde_json::to_string_pretty(decision)?);
    Ok(())
}

fn run(cli: Cli, mut config: AnalysisConfig) -> Result<i32> {
    let quiet = cli.quiet;

    match cli.command {
        Commands::Analyze {
            snapshot,
            output,
            enforce,
        } => {
            let analyzer = PerformanceAnalyzer::new(config)?;
            let input = read_snapshot(&snapshot)?;
            let ctx = OperationContext::new("analyze");
            let (run, decision) = analyzer
                .analyze_json(&input)
                .with_context(|| format!("Failed to analyze {}", snapshot.display()))?;
            emit_events(&ctx, &run.events);

            let report = run.report.to_json_pretty()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, report)
                        .with_context(|| format!("Failed to write report {}", path.display()))?;
                    qprintln!(quiet, "Report written to {}", path.display());
                }
                None => println!("{report}"),
            }
            qprintln!(
                quiet,
                "Overall score {:.1}, performance score {:.1}",
                run.report.overall_score,
                run.report.performance_score
            );
            print_decision(&decision, quiet)?;

            Ok(if enforce { decision.exit_code() } else { 0 })
        }

        Commands::Gate {
            snapshot,
            performance_score,
        } => {
            if performance_score {
                config.gate.score_source = ScoreSource::Performance;
            }
            let analyzer = PerformanceAnalyzer::new(config)?;
            let input = read_snapshot(&snapshot)?;
            let ctx = OperationContext::new("gate");
            let (run, decision) = analyzer
                .analyze_json(&input)
                .with_context(|| format!("Failed to analyze {}", snapshot.display()))?;
            emit_events(&ctx, &run.events);
            print_decision(&decision, quiet)?;

            Ok(decision.exit_code())
        }

        Commands::Baselines => {
            let analyzer = PerformanceAnalyzer::new(config)?;
            qprintln!(quiet, "{:<36} {:>12}  {:<18} kind", "metric", "target", "direction");
            for entry in analyzer.baselines().iter() {
                println!(
                    "{:<36} {:>12}  {:<18} {:?}",
                    entry.metric_name,
                    entry.target_value,
                    format!("{:?}", entry.direction),
                    entry.kind
                );
            }
            Ok(0)
        }

        Commands::InitConfig { file } => {
            let toml = AnalysisConfig::default().to_toml()?;
            match file {
                Some(path) => {
                    std::fs::write(&path, toml)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    qprintln!(quiet, "Default configuration written to {}", path.display());
                }
                None => print!("{toml}"),
            }
            Ok(0)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let (verbose, quiet) = (cli.verbose, cli.quiet);

    // The config supplies the default log level, so it loads before logging starts
    let result = load_config(cli.config.as_deref()).and_then(|config| {
        // Ignore error if already initialized
        let _ = init_logging_with_default(verbose, quiet, &config.logging.level);
        run(cli, config)
    });

    match result {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            let _ = init_logging_with_level(verbose, quiet);
            log_error_with_context(&error, &OperationContext::new("perfgate-cli"));
            eprintln!("Error: {error:#}");
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfgate::default_filter;
    use tempfile::TempDir;

    fn run_args(args: &[&str]) -> Result<i32> {
        let cli = Cli::try_parse_from(args)?;
        let config = load_config(cli.config.as_deref())?;
        run(cli, config)
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from([
            "perfgate",
            "--verbose",
            "analyze",
            "results.json",
            "--output",
            "report.json",
            "--enforce",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Analyze { enforce: true, .. }
        ));

        let cli = Cli::try_parse_from(["perfgate", "gate", "r.json", "--performance-score"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Gate {
                performance_score: true,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["perfgate", "-v", "-q", "baselines"]).is_err());
    }

    #[test]
    fn test_gate_command_exit_codes() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("results.json");
        std::fs::write(
            &snapshot,
            r#"{"test_type": "ci", "api_error_rate": 0.2, "api_response_time_p95": 300}"#,
        )
        .unwrap();

        let path = snapshot.to_str().unwrap();
        assert_eq!(run_args(&["perfgate", "-q", "gate", path]).unwrap(), 1);

        std::fs::write(&snapshot, r#"{"api_response_time_p95": 300}"#).unwrap();
        assert_eq!(run_args(&["perfgate", "-q", "gate", path]).unwrap(), 0);
    }

    #[test]
    fn test_init_config_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("perfgate.toml");
        assert_eq!(
            run_args(&["perfgate", "-q", "init-config", path.to_str().unwrap()]).unwrap(),
            0
        );

        let loaded = AnalysisConfig::from_file(&path).unwrap();
        assert_eq!(loaded, AnalysisConfig::default());
    }

    #[test]
    fn test_config_file_sets_default_log_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("perfgate.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(
            default_filter(false, false, &config.logging.level),
            "perfgate=debug,error"
        );
        // flags still take precedence over the configured level
        assert_eq!(
            default_filter(false, true, &config.logging.level),
            "error"
        );

        std::fs::write(&path, "[logging]\nlevel = \"chatty\"\n").unwrap();
        assert!(load_config(Some(path.as_path())).is_err());
    }
}
