// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource records produced by `resource` jobs.
//!
//! Output format: `key: value` lines, records separated by blank lines. A
//! line starting with whitespace continues the previous value. A record
//! containing a line that fits neither form is dropped as a whole.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRecord(BTreeMap<String, String>);

impl ResourceRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResourceRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Result of parsing resource job output.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedResources {
    pub records: Vec<ResourceRecord>,
    /// Number of malformed records discarded.
    pub dropped: usize,
}

pub fn parse_records(output: &str) -> ParsedResources {
    let mut parsed = ParsedResources::default();
    let mut current = ResourceRecord::default();
    let mut last_key: Option<String> = None;
    let mut malformed = false;

    let mut flush = |current: &mut ResourceRecord, malformed: &mut bool| {
        if *malformed {
            parsed.dropped += 1;
        } else if !current.is_empty() {
            parsed.records.push(std::mem::take(current));
        }
        *current = ResourceRecord::default();
        *malformed = false;
    };

    for line in output.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut malformed);
            last_key = None;
            continue;
        }
        if malformed {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            match last_key.as_ref().and_then(|k| current.0.get_mut(k)) {
                Some(value) => {
                    value.push('\n');
                    value.push_str(line.trim());
                }
                None => malformed = true,
            }
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) if valid_key(key.trim_end()) => {
                let key = key.trim_end().to_string();
                current.insert(key.clone(), value.trim());
                last_key = Some(key);
            }
            _ => malformed = true,
        }
    }
    flush(&mut current, &mut malformed);
    parsed
}

/// Write records back out in the format [`parse_records`] reads.
pub fn render_records(records: &[ResourceRecord]) -> String {
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for (key, value) in record.iter() {
            let mut lines = value.lines();
            out.push_str(key);
            out.push_str(": ");
            out.push_str(lines.next().unwrap_or_default());
            out.push('\n');
            for line in lines {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
