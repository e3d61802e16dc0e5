use super::{AppContext, SyncCommand};
use crate::fetch_ui::{truncate_url, with_spinner};
use bukusync::error::Result;
use bukusync::fetch::{HttpTitleFetcher, TitleFetcher};
use bukusync::utils;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchTitleCommand {
    pub url: String,
}

impl SyncCommand for FetchTitleCommand {
    fn execute(&self, ctx: &AppContext) -> Result<()> {
        let url = utils::normalize_url(&self.url, &ctx.config.default_scheme);
        let fetcher = HttpTitleFetcher::from_config(ctx.config)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let shown = truncate_url(&url, 60);
        let title = with_spinner(
            &runtime,
            &format!("Fetching: {}", shown),
            fetcher.fetch_title(&url),
            |title| match title {
                Some(_) => Some(format!("✓ {}", shown)),
                None => Some(format!("✗ {}", shown)),
            },
        );
        match title {
            Some(title) => println!("{}", title),
            None => {
                eprintln!("No title found for {}", url);
                println!("{}", utils::fallback_title(&url));
            }
        }
        Ok(())
    }
}
