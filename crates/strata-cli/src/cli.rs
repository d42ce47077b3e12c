use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective configuration, annotated
    Config,

    /// Generate a default config file at the config path
    #[clap(name = "defconfig")]
    DefConfig,

    /// List every persisted procedure identity and its state
    #[clap(name = "status", visible_alias = "ls")]
    Status,

    /// Show the persisted state of one identity, and its plan when compiled
    #[command(arg_required_else_help = true)]
    #[clap(name = "inspect")]
    Inspect {
        /// Identity key, e.g. `Users::find` or `Users::find@<checksum>`
        #[arg(required = true)]
        key: String,
    },

    /// Forget persisted state so identities are observed from scratch
    #[clap(name = "reset")]
    Reset {
        /// Identity key to reset
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        key: Option<String>,

        /// Reset every identity
        #[arg(short, long)]
        all: bool,

        /// Keep compiled artifact files on disk
        #[arg(long)]
        keep_artifacts: bool,
    },
}
