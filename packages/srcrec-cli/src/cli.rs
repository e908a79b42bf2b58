use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "srcrec",
    version,
    about = "MEG head modelling and batch source reconstruction",
    long_about = "Build head models and run MEG cleaning and source reconstruction for a list of \
                  subjects, writing per-label time courses as .npy files.\n\
                  Requires Python with MNE-Python. Set $SRCREC_PYTHON or use --python."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the source space and BEM solution for one anatomy subject
    BuildModel(BuildModelArgs),
    /// Clean and source-localize every subject, one after another
    Run(RunArgs),
    /// Check that each subject's inputs exist without running anything
    Validate(ValidateArgs),
    /// Show Python and MNE-Python detection results
    Info(InfoArgs),
    /// Print the effective configuration as JSON
    Config(ConfigArgs),
}

/// Options shared by every command that reads the study configuration.
#[derive(Args, Clone, Default)]
pub struct StudyArgs {
    /// Configuration file (default: ./srcrec.json, then the user config dir)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// FreeSurfer subjects directory
    #[arg(long)]
    pub subjects_dir: Option<PathBuf>,

    /// Directory holding raw recordings
    #[arg(long)]
    pub raw_dir: Option<PathBuf>,

    /// Directory holding coordinate transforms
    #[arg(long)]
    pub trans_dir: Option<PathBuf>,

    /// Directory receiving label time-course arrays
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Use this anatomy for every subject instead of each subject's own
    #[arg(long)]
    pub anatomy_subject: Option<String>,
}

/// Options locating the Python toolkit.
#[derive(Args, Clone, Default)]
pub struct ToolkitArgs {
    /// Python interpreter with MNE-Python installed
    #[arg(long, env = "SRCREC_PYTHON")]
    pub python: Option<String>,

    /// Use this bridge script instead of the embedded one
    #[arg(long)]
    pub bridge_script: Option<PathBuf>,
}

#[derive(Args)]
pub struct BuildModelArgs {
    /// Anatomy subject to build (defaults to the configured anatomy subject)
    #[arg(long)]
    pub subject: Option<String>,

    #[command(flatten)]
    pub study: StudyArgs,

    #[command(flatten)]
    pub toolkit: ToolkitArgs,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Fit ICA on continuous data with fixed amplitude thresholds
    Fixed,
    /// Estimate rejection thresholds from the data and fit ICA on epochs
    Adaptive,
}

#[derive(Args)]
pub struct RunArgs {
    /// Subjects to process (overrides the configuration file)
    #[arg(long, num_args = 1..)]
    pub subjects: Option<Vec<String>>,

    /// Discover subjects from recordings in the raw directory
    #[arg(long, conflicts_with = "subjects")]
    pub discover: bool,

    /// ICA rejection strategy (overrides the configuration file)
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    #[command(flatten)]
    pub study: StudyArgs,

    #[command(flatten)]
    pub toolkit: ToolkitArgs,

    /// Write the batch report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Exit non-zero if any subject failed
    #[arg(long)]
    pub strict: bool,

    /// Log the toolkit traceback of failed subjects
    #[arg(long)]
    pub traceback: bool,

    /// Suppress per-subject progress on stderr
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Subjects to check (overrides the configuration file)
    #[arg(long, num_args = 1..)]
    pub subjects: Option<Vec<String>>,

    /// Discover subjects from recordings in the raw directory
    #[arg(long, conflicts_with = "subjects")]
    pub discover: bool,

    #[command(flatten)]
    pub study: StudyArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub toolkit: ToolkitArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub study: StudyArgs,

    /// Print the built-in defaults, ignoring any configuration file
    #[arg(long)]
    pub defaults: bool,

    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}
