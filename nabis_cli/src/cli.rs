use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::info;
use nabis::{config::Config, Nabis};
use spinners::{Spinner, Spinners};

use crate::display::{
    boundary_table, display_tables, ingest_table, summary_table, validation_table, written_table,
};
use crate::error::NabisCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const FAILED_PROGRESS_STRING: &str = "✘";
const RUNNING_TAIL_STRING: &str = "...";

/// Runs `task` behind a spinner unless progress output is suppressed. The spinner is stopped on
/// both success and failure.
fn with_spinner<T>(
    quiet: bool,
    message: &str,
    task: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let mut spinner = (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    });
    let result = task();
    if let Some(s) = spinner.as_mut() {
        let symbol = if result.is_ok() {
            COMPLETE_PROGRESS_STRING
        } else {
            FAILED_PROGRESS_STRING
        };
        s.stop_with_symbol(symbol);
    }
    result
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    fn run(&self, config: Config) -> NabisCliResult<()>;
}

/// The Indicators command parses the per-region spreadsheets into the long table, the indicator
/// catalog and the region hierarchy.
#[derive(Args, Debug)]
pub struct IndicatorsCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for IndicatorsCommand {
    fn run(&self, config: Config) -> NabisCliResult<()> {
        info!("Running `indicators` subcommand");
        let nabis = Nabis::new_with_config(config);
        let build = with_spinner(self.quiet, "Parsing spreadsheets", || {
            nabis.build_indicators()
        })?;
        let summary = build.table.summary()?;
        let written = nabis.write_indicators(&build)?;
        display_tables([
            ingest_table(&build.report),
            summary_table(&summary),
            written_table(&written),
        ]);
        Ok(())
    }
}

/// The Boundaries command builds the simplified municipal layer and the province outlines.
#[derive(Args, Debug)]
pub struct BoundariesCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for BoundariesCommand {
    fn run(&self, config: Config) -> NabisCliResult<()> {
        info!("Running `boundaries` subcommand");
        let nabis = Nabis::new_with_config(config);
        let build = with_spinner(self.quiet, "Building boundary layers", || {
            nabis.build_boundaries()
        })?;
        let written = nabis.write_boundaries(&build)?;
        display_tables([boundary_table(&build.report), written_table(&written)]);
        Ok(())
    }
}

/// The Validate command joins the written region hierarchy to the written municipal layer and
/// fails when a key is unmatched or ambiguous.
#[derive(Args, Debug)]
pub struct ValidateCommand;

impl RunCommand for ValidateCommand {
    fn run(&self, config: Config) -> NabisCliResult<()> {
        info!("Running `validate` subcommand");
        let report = Nabis::new_with_config(config).validate()?;
        display_tables([validation_table(&report)]);
        report.ensure_ok()?;
        Ok(())
    }
}

/// The All command runs both pipelines, replaces all five artifacts together and validates the
/// join.
#[derive(Args, Debug)]
pub struct AllCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for AllCommand {
    fn run(&self, config: Config) -> NabisCliResult<()> {
        info!("Running `all` subcommand");
        let nabis = Nabis::new_with_config(config);
        let indicators = with_spinner(self.quiet, "Parsing spreadsheets", || {
            nabis.build_indicators()
        })?;
        let boundaries = with_spinner(self.quiet, "Building boundary layers", || {
            nabis.build_boundaries()
        })?;

        let summary = indicators.table.summary()?;
        let written = nabis.write_all(&indicators, &boundaries)?;
        let report = nabis.validate_builds(&indicators, &boundaries);
        display_tables([
            ingest_table(&indicators.report),
            summary_table(&summary),
            boundary_table(&boundaries.report),
            validation_table(&report),
            written_table(&written),
        ]);
        report.ensure_ok()?;
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Builds the data files behind the NABIS regional indicator dashboard", long_about = None, name="nabis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress spinners to stdout. Reports and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
    #[arg(
        short = 'c',
        long = "config",
        help = "Path of a TOML config file. Defaults to `nabis/config.toml` in the user's config directory.",
        global = true
    )]
    pub config: Option<PathBuf>,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Build the long indicator table, indicator catalog and region hierarchy
    Indicators(IndicatorsCommand),
    /// Build the municipal and province boundary layers
    Boundaries(BoundariesCommand),
    /// Check that the written indicator and boundary artifacts join on their keys
    Validate(ValidateCommand),
    /// Build everything, write it atomically and validate the join
    All(AllCommand),
}
