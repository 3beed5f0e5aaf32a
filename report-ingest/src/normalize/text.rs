//! String transforms used to build report messages.
//!
//! All functions are total: empty input yields empty output and a missing
//! delimiter leaves the input unchanged.

/// Name of a CSP directive without its source list.
///
/// `"script-src 'self' cdn.example.com"` becomes `"script-src"`.
pub fn directive_name(directive: &str) -> &str {
    let directive = directive.trim_start();
    match directive.split_once(' ') {
        Some((name, _)) => name,
        None => directive,
    }
}

/// Drops everything up to and including the first `://`.
pub fn strip_scheme(uri: &str) -> &str {
    match uri.split_once("://") {
        Some((_, rest)) => rest,
        None => uri,
    }
}

/// Host part of a blocked URI: the scheme is stripped and the remainder is cut
/// at the first `/`.
///
/// Keywords browsers send instead of a URI (`inline`, `eval`, `self`) pass
/// through unchanged.
pub fn blocked_host(uri: &str) -> &str {
    let without_scheme = strip_scheme(uri);
    match without_scheme.split_once('/') {
        Some((host, _)) => host,
        None => without_scheme,
    }
}

/// Collapses line breaks into spaces and trims the result.
pub fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Joins the non-empty parts with a single space.
pub fn join_present<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
