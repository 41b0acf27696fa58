use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_RESPONSE_CHARS: usize = 150;

const TRUNCATED_CHARS: usize = MAX_RESPONSE_CHARS - 3;

static LEADING_ROLE_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:question|answer|assistant|user|system|q|a)\s*:\s*)+")
        .expect("valid role marker regex")
});

/// Normalizes raw model output: no leading role markers, at most
/// `MAX_RESPONSE_CHARS` characters, always ending in `.`, `!` or `?`.
pub fn post_process(raw: &str) -> String {
    let stripped = LEADING_ROLE_MARKERS.replace(raw, "");
    let mut response = stripped.trim().to_string();

    let length = response.chars().count();
    let needs_period = !ends_with_terminal(&response);
    if length > MAX_RESPONSE_CHARS || (length == MAX_RESPONSE_CHARS && needs_period) {
        response = response.chars().take(TRUNCATED_CHARS).collect::<String>() + "...";
    }

    if !ends_with_terminal(&response) {
        response.push('.');
    }

    response
}

fn ends_with_terminal(text: &str) -> bool {
    matches!(text.chars().last(), Some('.' | '!' | '?'))
}
