//! Helpers for header values that carry parameters (`type/subtype; q=0.9`).

/// Headers whose values are a base value plus `;`-separated parameters, and
/// so need to be compared piecewise rather than as a single string.
pub const PARAMETERISED_HEADERS: [&str; 2] = ["accept", "content-type"];

/// True if the named header should be matched as a parameterised value.
pub fn is_parameterised_header(name: &str) -> bool {
    PARAMETERISED_HEADERS.contains(&name.to_lowercase().as_str())
}

/// Split a header value into its base value and its parameters, preserving
/// parameter order. Whitespace around each part is trimmed; a parameter
/// without an `=` is kept with an empty value.
pub fn parse_header_value(value: &str) -> (String, Vec<(String, String)>) {
    let mut parts = value.split(';');
    let base = parts.next().unwrap_or_default().trim().to_string();
    let parameters = parts
        .filter(|part| !part.trim().is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            None => (part.trim().to_string(), String::new()),
        })
        .collect();
    (base, parameters)
}
