//! Username normalization and CSV parsing for lead imports.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// Instagram profile URLs accepted as extraction targets.
static PROFILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?instagram\.com/@?([A-Za-z0-9._]+)/?(?:[?#].*)?$")
        .expect("profile URL pattern is valid")
});

/// Where the usernames of an import come from.
#[derive(Debug, Clone)]
pub enum UsernameSource {
    /// Newline-separated usernames, as pasted into a text box.
    Text(String),
    /// Raw CSV bytes with a `username` or `handle` column.
    Csv(Vec<u8>),
}

impl UsernameSource {
    /// Resolve to a normalized, non-empty list of usernames.
    pub fn usernames(&self) -> Result<Vec<String>, ValidationError> {
        let usernames = match self {
            UsernameSource::Text(raw) => normalize_usernames(raw),
            UsernameSource::Csv(bytes) => parse_csv_usernames(bytes)?,
        };
        if usernames.is_empty() {
            return Err(ValidationError::NoUsernames);
        }
        Ok(usernames)
    }
}

/// Normalize a single username: trim, strip one leading `@`, trim again.
/// Returns `None` when nothing is left. Case is preserved.
pub fn normalize_username(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    (!stripped.is_empty()).then(|| stripped.to_string())
}

/// Normalize newline-separated input into usernames, in input order.
///
/// Duplicates are kept; see [`count_duplicates`].
pub fn normalize_usernames(raw: &str) -> Vec<String> {
    raw.lines().filter_map(normalize_username).collect()
}

/// Number of entries that repeat an earlier one (case-insensitive).
pub fn count_duplicates(usernames: &[String]) -> usize {
    let mut seen = HashSet::new();
    usernames
        .iter()
        .filter(|u| !seen.insert(u.to_lowercase()))
        .count()
}

/// Extract usernames from CSV text with a header row.
///
/// The `username` column wins over `handle` when both are present and the
/// cell is non-empty. Rows where neither yields a value are skipped.
pub fn parse_csv_usernames(bytes: &[u8]) -> Result<Vec<String>, ValidationError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| ValidationError::Csv(e.to_string()))?
        .clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
    };
    let username_col = column("username");
    let handle_col = column("handle");

    if username_col.is_none() && handle_col.is_none() {
        return Err(ValidationError::MissingCsvColumn);
    }

    let mut usernames = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ValidationError::Csv(e.to_string()))?;
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).and_then(normalize_username);

        if let Some(username) = cell(username_col).or_else(|| cell(handle_col)) {
            usernames.push(username);
        }
    }

    if usernames.is_empty() {
        return Err(ValidationError::NoUsernames);
    }
    Ok(usernames)
}

/// Normalize an extraction target given as `@user`, `user` or a profile URL.
/// Returns the bare handle.
pub fn normalize_target_account(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if let Some(caps) = PROFILE_URL.captures(trimmed) {
        return Ok(caps[1].to_string());
    }
    normalize_username(trimmed).ok_or(ValidationError::EmptyTarget)
}
