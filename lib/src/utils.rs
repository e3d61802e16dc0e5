use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Scheme prepended to urls typed without one.
pub const DEFAULT_SCHEME: &str = "https";

fn scheme_regex() -> &'static Regex {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    SCHEME.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("scheme pattern is valid")
    })
}

pub fn get_config_dir() -> PathBuf {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(path).join("bukusync");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config/bukusync");
    }

    #[cfg(target_os = "windows")]
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata).join("bukusync");
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub fn has_scheme(url: &str) -> bool {
    scheme_regex().is_match(url)
}

/// Trim the url and prepend `<default_scheme>://` when it has no scheme.
pub fn normalize_url(url: &str, default_scheme: &str) -> String {
    let url = url.trim();
    if has_scheme(url) {
        url.to_string()
    } else {
        format!("{}://{}", default_scheme, url)
    }
}

pub fn strip_scheme(url: &str) -> &str {
    match scheme_regex().find(url) {
        Some(m) => &url[m.end()..],
        None => url,
    }
}

/// Hostname of `url` without a leading `www.`, or the url itself when it has no host.
pub fn fallback_title(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed.host_str().map(|host| {
                host.strip_prefix("www.").unwrap_or(host).to_string()
            })
        })
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| url.to_string())
}
