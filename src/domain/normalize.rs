use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

const MAX_TITLE_LEN: usize = 200;

static TITLE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+[-–|]\s+.*$").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Strips the trailing site/store suffix ("Some Product - BestBuy"),
/// collapses whitespace and truncates to 200 characters.
pub fn clean_title(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let title = TITLE_SUFFIX.replace(raw, "");
    let title = WHITESPACE.replace_all(&title, " ");
    title.trim().chars().take(MAX_TITLE_LEN).collect()
}

/// Lowercases, collapses non-alphanumeric runs to a single underscore and
/// folds common synonyms onto one canonical key.
pub fn normalize_attribute_key(raw: &str) -> String {
    let key = NON_ALNUM
        .replace_all(&raw.to_lowercase(), "_")
        .trim_matches('_')
        .to_string();
    match key.as_str() {
        "colour" => "color".to_string(),
        "screen" | "display" => "screen_size".to_string(),
        _ => key,
    }
}

/// Registrable host of a URL: lowercase, scheme/path stripped, leading
/// "www." removed. Empty string when no host can be recovered.
pub fn registrable_domain(url: &str) -> String {
    let host = match Url::parse(url) {
        Ok(parsed) => parsed.host_str().unwrap_or("").to_string(),
        // Bare hosts without a scheme don't parse as absolute URLs.
        Err(_) => url
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or("")
            .to_string(),
    };
    let host = host.to_lowercase();
    match host.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => host,
    }
}
