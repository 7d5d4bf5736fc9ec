//! Secrets and listing types exchanged with the server.

use std::fmt;

use serde::Deserialize;

/// User-supplied bearer credential.
///
/// Held in memory only. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a credential, trimming surrounding whitespace.
    ///
    /// Returns `None` when nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Short-lived token authorising one stream upgrade.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<{} bytes>)", self.0.len())
    }
}

/// A generated report known to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// File name, e.g. `NORMAL-lab-01.csv`.
    pub name: String,
    /// Server-side path, usable as a report identifier.
    pub path: String,
}

/// Body of a successful `/search` response.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub report_list: Vec<std::collections::BTreeMap<String, String>>,
}

impl SearchResponse {
    pub(crate) fn into_entries(self) -> Vec<ReportEntry> {
        self.report_list
            .into_iter()
            .flat_map(|item| item.into_iter())
            .map(|(name, path)| ReportEntry { name, path })
            .collect()
    }
}
