use super::{AppContext, SyncCommand};
use bukusync::config::Config;
use bukusync::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigCommand {
    pub init: bool,
}

impl SyncCommand for ConfigCommand {
    fn execute(&self, ctx: &AppContext) -> Result<()> {
        let path = ctx
            .config_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Config::default_path);

        if self.init {
            ctx.config.save_to_path(&path)?;
            eprintln!("Wrote {}", path.display());
        }

        println!("# {}", path.display());
        print!("{}", serde_yaml::to_string(ctx.config)?);
        Ok(())
    }
}
