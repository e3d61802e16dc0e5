use crate::output::colorize::{Colorize, ColorizeBookmark, PlainBookmark};
use bukusync::error::Result;
use bukusync::models::Bookmark;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Colored,
}

impl OutputFormat {
    pub fn from_string(format: &str) -> Self {
        match format {
            "json" => OutputFormat::Json,
            "yaml" | "yml" => OutputFormat::Yaml,
            _ => OutputFormat::Colored,
        }
    }

    /// Render a listing; entries are numbered from 1 in list order.
    pub fn render(self, records: &[Bookmark], no_color: bool, now: DateTime<Utc>) -> Result<String> {
        let rendered = match self {
            OutputFormat::Json => serde_json::to_string_pretty(records)?,
            OutputFormat::Yaml => serde_yaml::to_string(records)?,
            OutputFormat::Colored => {
                let mut out = String::new();
                for (i, b) in records.iter().enumerate() {
                    if no_color {
                        out.push_str(&PlainBookmark(i + 1, b, now).to_plain());
                    } else {
                        out.push_str(&ColorizeBookmark(i + 1, b, now).to_colored());
                    }
                }
                out
            }
        };
        Ok(rendered)
    }

    pub fn print_bookmarks(self, records: &[Bookmark], no_color: bool) -> Result<()> {
        if records.is_empty() && self == OutputFormat::Colored {
            println!("No bookmarks.");
            return Ok(());
        }
        println!("{}", self.render(records, no_color, Utc::now())?.trim_end());
        Ok(())
    }
}
