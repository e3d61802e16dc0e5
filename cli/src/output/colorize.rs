use bukusync::models::Bookmark;
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

pub trait Colorize {
    fn to_colored(&self) -> String;
}

/// Marker shown next to entries the store has not confirmed yet
pub const PENDING_MARKER: &str = "(saving)";

/// Listing entry: position in the list, the bookmark, and the time to age it against.
pub struct ColorizeBookmark<'a>(pub usize, pub &'a Bookmark, pub DateTime<Utc>);

impl<'a> Colorize for ColorizeBookmark<'a> {
    fn to_colored(&self) -> String {
        let ColorizeBookmark(index, bookmark, now) = self;
        let mut s = String::new();
        let index = index.to_string();
        if bookmark.is_provisional() {
            s.push_str(&format!(
                "{}. {} {}\n",
                index.bright_blue(),
                bookmark.title.bold().green(),
                PENDING_MARKER.dimmed(),
            ));
        } else {
            s.push_str(&format!(
                "{}. {}\n",
                index.bright_blue(),
                bookmark.title.bold().green(),
            ));
        }
        let padding = index.len() + 3;
        // padding for alignment
        s.push_str(&format!(
            "{:>padding$} {}\n",
            ">".red(),
            bookmark.display_url().yellow()
        ));
        s.push_str(&format!(
            "{:>padding$} {}\n",
            "*".red(),
            bookmark.favicon_or_default().dimmed()
        ));
        s.push_str(&format!(
            "{:>padding$} {}\n",
            "@".red(),
            time_ago(bookmark.created_at, *now).dimmed()
        ));
        s
    }
}

/// Same layout as [`ColorizeBookmark`] without escape codes.
pub struct PlainBookmark<'a>(pub usize, pub &'a Bookmark, pub DateTime<Utc>);

impl<'a> PlainBookmark<'a> {
    pub fn to_plain(&self) -> String {
        let PlainBookmark(index, bookmark, now) = self;
        let index = index.to_string();
        let padding = index.len() + 3;
        let marker = if bookmark.is_provisional() {
            format!(" {}", PENDING_MARKER)
        } else {
            String::new()
        };
        format!(
            "{}. {}{}\n{:>padding$} {}\n{:>padding$} {}\n{:>padding$} {}\n",
            index,
            bookmark.title,
            marker,
            ">",
            bookmark.display_url(),
            "*",
            bookmark.favicon_or_default(),
            "@",
            time_ago(bookmark.created_at, *now),
        )
    }
}

/// Coarse age of `at` relative to `now`, e.g. "3m ago".
pub fn time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    match secs {
        s if s < 10 => "just now".to_string(),
        s if s < 60 => format!("{}s ago", s),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}
