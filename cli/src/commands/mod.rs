use crate::format::OutputFormat;
use bukusync::config::Config;
use bukusync::error::Result;
use std::path::Path;

pub struct AppContext<'a> {
    pub config: &'a Config,
    pub config_path: Option<&'a Path>,
    pub nc: bool,
    pub format: OutputFormat,
}

pub mod config;
pub mod fetch_title;
pub mod shell;

pub trait SyncCommand {
    fn execute(&self, ctx: &AppContext) -> Result<()>;
}

/// Enum-based dispatch for commands (avoids Box<dyn SyncCommand>)
pub enum CommandEnum {
    Shell(shell::ShellCommand),
    FetchTitle(fetch_title::FetchTitleCommand),
    Config(config::ConfigCommand),
}

impl CommandEnum {
    pub fn execute(&self, ctx: &AppContext) -> Result<()> {
        match self {
            Self::Shell(cmd) => cmd.execute(ctx),
            Self::FetchTitle(cmd) => cmd.execute(ctx),
            Self::Config(cmd) => cmd.execute(ctx),
        }
    }
}
