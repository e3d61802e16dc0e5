use super::{AppContext, SyncCommand};
use crate::interactive::{self, ShellOptions};
use bukusync::error::{BukusyncError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellCommand {
    pub user: Option<String>,
    pub sessions: usize,
    pub offline: bool,
}

impl SyncCommand for ShellCommand {
    fn execute(&self, ctx: &AppContext) -> Result<()> {
        if self.sessions == 0 {
            return Err(BukusyncError::InvalidInput(
                "at least one session is required".to_string(),
            ));
        }

        let options = ShellOptions {
            user: self.user.clone(),
            sessions: self.sessions,
            offline: self.offline,
        };
        interactive::run(ctx, &options)
    }
}
