//! Display filename derivation for report identifiers.

use crate::constants::DEFAULT_REPORT_FILENAME;

/// Derives the local filename for a report identifier.
///
/// The identifier is split on every "digit followed by `-`" and the second
/// segment is used, so `3-quarterly.csv` becomes `quarterly.csv`. Path
/// separators inside that segment become `_`. Without a usable second
/// segment the last path component of the identifier is used, and
/// [`DEFAULT_REPORT_FILENAME`] when that is empty too.
pub fn report_filename(identifier: &str) -> String {
    if let Some(segment) = second_segment(identifier)
        && let Some(name) = sanitize(segment)
    {
        return name;
    }
    identifier
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_REPORT_FILENAME.to_string())
}

/// Returns the text between the first and second `[0-9]-` delimiter.
fn second_segment(identifier: &str) -> Option<&str> {
    let start = find_delimiter(identifier, 0)? + 2;
    let end = find_delimiter(identifier, start).unwrap_or(identifier.len());
    Some(&identifier[start..end])
}

/// Finds the byte offset of the next ASCII digit followed by `-`.
fn find_delimiter(s: &str, from: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    (from..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i].is_ascii_digit() && bytes[i + 1] == b'-')
}

fn sanitize(segment: &str) -> Option<String> {
    let name: String = segment
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.' || c == '_') {
        None
    } else {
        Some(trimmed.to_string())
    }
}
