use crate::commands::config::ConfigCommand;
use crate::commands::fetch_title::FetchTitleCommand;
use crate::commands::shell::ShellCommand;
use crate::commands::{AppContext, CommandEnum};
use crate::format::OutputFormat;
use bukusync::config::Config;
use bukusync::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_SESSIONS: usize = 2;

#[derive(Parser)]
#[command(author, version, about, long_about = None, disable_version_flag = true)]
pub struct Cli {
    /// Show the program version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Optional custom configuration file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable color output
    #[arg(long)]
    pub nc: bool,

    /// Show debug information
    #[arg(short = 'g', long = "debug")]
    pub debug: bool,

    /// Output format for listings (json, yaml; colored by default)
    #[arg(short = 'f', long)]
    pub format: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive session against an in-process store
    Shell {
        /// Sign in as this user right away
        #[arg(short, long)]
        user: Option<String>,

        /// Number of synchronized sessions sharing the store
        #[arg(short, long, default_value_t = DEFAULT_SESSIONS)]
        sessions: usize,

        /// Add without connecting to web
        #[arg(long)]
        offline: bool,
    },

    /// Fetch the title of a page, as done for bookmarks added without one
    FetchTitle {
        /// Page URL
        url: String,
    },

    /// Show the effective configuration
    Config {
        /// Write the configuration file with the effective values
        #[arg(long)]
        init: bool,
    },
}

fn to_command(command: Option<Commands>) -> CommandEnum {
    match command {
        Some(Commands::Shell {
            user,
            sessions,
            offline,
        }) => CommandEnum::Shell(ShellCommand {
            user,
            sessions,
            offline,
        }),
        Some(Commands::FetchTitle { url }) => CommandEnum::FetchTitle(FetchTitleCommand { url }),
        Some(Commands::Config { init }) => CommandEnum::Config(ConfigCommand { init }),
        None => CommandEnum::Shell(ShellCommand {
            user: None,
            sessions: DEFAULT_SESSIONS,
            offline: false,
        }),
    }
}

pub fn handle_args(cli: Cli, config: &Config) -> Result<()> {
    let format = cli
        .format
        .as_deref()
        .map(OutputFormat::from_string)
        .unwrap_or(OutputFormat::Colored);

    let ctx = AppContext {
        config,
        config_path: cli.config.as_deref(),
        nc: cli.nc,
        format,
    };

    to_command(cli.command).execute(&ctx)
}
