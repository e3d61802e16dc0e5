use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::time::Duration;

/// Drive `work` to completion on `runtime` behind an animated spinner.
///
/// `describe` turns the outcome into the final status line; `None` clears the
/// spinner without a message.
pub fn with_spinner<T>(
    runtime: &tokio::runtime::Runtime,
    message: &str,
    work: impl Future<Output = T>,
    describe: impl FnOnce(&T) -> Option<String>,
) -> T {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = runtime.block_on(work);

    match describe(&result) {
        Some(status) => spinner.finish_with_message(status),
        None => spinner.finish_and_clear(),
    }
    result
}

/// Truncate URL to `max_len` characters with ellipsis
pub fn truncate_url(url: &str, max_len: usize) -> String {
    if url.chars().count() > max_len {
        let keep = max_len.saturating_sub(3); // Reserve 3 chars for "..."
        let head: String = url.chars().take(keep).collect();
        format!("{}...", head)
    } else {
        url.to_string()
    }
}
