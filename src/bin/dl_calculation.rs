use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use pelicun::base::str2bool;
use pelicun::dl_calculation::{run_pelicun, RunArgs, RunOutcome};
use pelicun::VERSION;

fn parse_flag(value: &str) -> Result<bool, String> {
    str2bool(value).map_err(|err| err.to_string())
}

#[derive(Debug, Parser)]
#[command(name = "dl_calculation")]
#[command(about = "Damage and loss calculation with pelicun", version)]
struct Cli {
    /// Configuration file of the assessment
    #[arg(short = 'c', long = "filenameDL")]
    filename_dl: PathBuf,

    /// Demand file used when the configuration names none
    #[arg(short = 'd', long = "demandFile")]
    demand_file: Option<PathBuf>,

    /// Sample size used when the configuration gives none
    #[arg(short = 's', long = "Realizations")]
    realizations: Option<usize>,

    #[arg(long = "dirnameOutput")]
    dirname_output: Option<PathBuf>,

    #[arg(long = "event_time")]
    event_time: Option<String>,

    #[arg(long = "detailed_results", default_value = "true", num_args = 0..=1,
          default_missing_value = "true", value_parser = parse_flag)]
    detailed_results: bool,

    #[arg(long = "coupled_EDP", default_value = "false", num_args = 0..=1,
          default_missing_value = "false", value_parser = parse_flag)]
    coupled_edp: bool,

    #[arg(long = "log_file", default_value = "true", num_args = 0..=1,
          default_missing_value = "true", value_parser = parse_flag)]
    log_file: bool,

    #[arg(long = "ground_failure", default_value = "false", num_args = 0..=1,
          default_missing_value = "false", value_parser = parse_flag)]
    ground_failure: bool,

    #[arg(long = "auto_script")]
    auto_script: Option<PathBuf>,

    #[arg(long = "resource_dir")]
    resource_dir: Option<PathBuf>,

    #[arg(long = "custom_model_dir")]
    custom_model_dir: Option<PathBuf>,

    #[arg(long = "regional", default_value = "false", num_args = 0..=1,
          default_missing_value = "false", value_parser = parse_flag)]
    regional: bool,

    /// Output formats, e.g. `csv`, `json`, or `csv,json`
    #[arg(long = "output_format")]
    output_format: Option<String>,

    #[arg(long = "color_warnings", default_value = "false", num_args = 0..=1,
          default_missing_value = "true", value_parser = parse_flag)]
    color_warnings: bool,
}

impl Cli {
    fn run_args(self) -> RunArgs {
        log::debug!(
            "accepted for compatibility: event_time={:?} log_file={} ground_failure={} regional={}",
            self.event_time,
            self.log_file,
            self.ground_failure,
            self.regional
        );
        RunArgs {
            config_path: self.filename_dl,
            demand_file: self.demand_file,
            output_path: self.dirname_output,
            coupled_edp: self.coupled_edp,
            realizations: self.realizations,
            detailed_results: self.detailed_results,
            output_format: self.output_format,
            custom_model_dir: self.custom_model_dir,
            resource_dir: self.resource_dir,
            auto_script: self.auto_script,
            color_warnings: self.color_warnings,
        }
    }
}

fn run(cli: Cli) -> Result<RunOutcome> {
    let args = cli.run_args();
    run_pelicun(&args)
        .with_context(|| format!("damage and loss calculation for {}", args.config_path.display()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    if std::env::args().len() <= 1 {
        println!("Welcome. This is pelicun version {VERSION}");
        println!(
            "To access the documentation visit https://nheri-simcenter.github.io/pelicun/index.html"
        );
        println!();
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    }

    let cli = Cli::parse();
    log::info!("Initializing pelicun calculation...");

    match run(cli) {
        Ok(RunOutcome::Completed(summary)) => {
            log::info!(
                "{} result files written to {}",
                summary.files.len(),
                summary.output_dir.display()
            );
            log::info!("pelicun calculation completed.");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Terminated(_)) => {
            log::error!("pelicun calculation failed.");
            ExitCode::FAILURE
        }
        Err(err) => {
            log::error!("{err:#}");
            log::error!("pelicun calculation failed.");
            ExitCode::FAILURE
        }
    }
}
