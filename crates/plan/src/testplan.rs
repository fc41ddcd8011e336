// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test plans and job-id patterns.

use cb_core::{CertificationStatus, JobId, NAMESPACE_SEP};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Anchored regular expression over fully qualified job ids.
#[derive(Debug, Clone)]
pub struct IdPattern {
    source: String,
    regex: Regex,
}

impl IdPattern {
    /// Compile `pattern`, qualifying it with `namespace` when it has none.
    pub fn new(namespace: &str, pattern: &str) -> Result<Self, regex::Error> {
        let pattern = pattern.trim();
        let qualified = if pattern.contains(NAMESPACE_SEP) || namespace.is_empty() {
            pattern.to_string()
        } else {
            format!("{}{NAMESPACE_SEP}{pattern}", regex::escape(namespace))
        };
        let regex = Regex::new(&format!("^(?:{qualified})$"))?;
        Ok(Self { source: pattern.to_string(), regex })
    }

    pub fn matches(&self, id: &str) -> bool {
        self.regex.is_match(id)
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// One `include` line: a pattern with an optional inline override,
/// e.g. `disk/.* certification-status=blocker`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeEntry {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_status: Option<CertificationStatus>,
}

impl IncludeEntry {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let pattern = words.next().ok_or_else(|| "empty include line".to_string())?.to_string();
        let mut certification_status = None;
        for word in words {
            match word.split_once('=') {
                Some(("certification-status", value)) => {
                    let status = serde_json::from_value(serde_json::Value::String(value.into()))
                        .map_err(|_| format!("unknown certification status '{value}'"))?;
                    certification_status = Some(status);
                }
                _ => return Err(format!("unexpected '{word}' in include line")),
            }
        }
        Ok(Self { pattern, certification_status })
    }
}

/// `apply <status> to <pattern>`, expressed as a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOverride {
    pub pattern: String,
    pub status: CertificationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub include: Vec<IncludeEntry>,
    /// Always selected; not subject to `exclude` or `match`.
    #[serde(default)]
    pub mandatory_include: Vec<String>,
    /// Resource jobs run before template expansion.
    #[serde(default)]
    pub bootstrap_include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Other plans whose fields are merged into this one.
    #[serde(default)]
    pub nested_part: Vec<String>,
    #[serde(default)]
    pub certification_status_overrides: Vec<StatusOverride>,
}

impl TestPlan {
    pub fn namespace(&self) -> &str {
        self.id.split_once(NAMESPACE_SEP).map_or("", |(ns, _)| ns)
    }

    /// Bootstrap ids, namespace-qualified.
    pub fn bootstrap_ids(&self) -> Vec<JobId> {
        self.bootstrap_include.iter().map(|p| JobId::qualified(self.namespace(), p.trim())).collect()
    }
}

#[cfg(test)]
#[path = "testplan_tests.rs"]
mod tests;
