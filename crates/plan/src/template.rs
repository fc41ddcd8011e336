// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template jobs, instantiated once per resource record.

use cb_core::{ExprError, Job, JobId, Requirement, ResourceRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Regex pattern for `{key}`; `${key}` is left for the shell.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
pub static FIELD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\$)?\{([a-zA-Z_][a-zA-Z0-9_-]*)\}").expect("constant regex pattern is valid")
});

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("template {template}: record has no field '{key}'")]
    MissingKey { template: String, key: String },
    #[error("template {template}: bad filter: {source}")]
    BadFilter {
        template: String,
        #[source]
        source: ExprError,
    },
}

/// A job definition with `{key}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    /// Resource job whose records drive instantiation.
    pub resource: JobId,
    /// Expression over the same resource; records failing it are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub job: Job,
}

/// Replace `{key}` placeholders with record values.
pub fn interpolate(template: &str, record: &ResourceRecord) -> Result<String, String> {
    let mut missing = None;
    let out = FIELD_PATTERN.replace_all(template, |caps: &regex::Captures| {
        if caps.get(1).is_some() {
            return caps[0].to_string();
        }
        let key = &caps[2];
        match record.get(key) {
            Some(val) => val.to_string(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                caps[0].to_string()
            }
        }
    });
    match missing {
        Some(key) => Err(key),
        None => Ok(out.into_owned()),
    }
}

impl Template {
    /// Instantiate for every record that passes the filter.
    ///
    /// Per-record failures are returned alongside the jobs that did
    /// instantiate.
    pub fn instantiate(&self, records: &[ResourceRecord]) -> (Vec<Job>, Vec<TemplateError>) {
        let filter = match self.filter.as_deref().map(Requirement::parse).transpose() {
            Ok(filter) => filter,
            Err(source) => {
                let err = TemplateError::BadFilter { template: self.id.clone(), source };
                return (Vec::new(), vec![err]);
            }
        };

        let mut jobs = Vec::new();
        let mut errors = Vec::new();
        for record in records {
            if let Some(filter) = &filter {
                if !filter.evaluate(std::slice::from_ref(record)) {
                    continue;
                }
            }
            match self.instantiate_one(record) {
                Ok(job) => jobs.push(job),
                Err(key) => {
                    errors.push(TemplateError::MissingKey { template: self.id.clone(), key })
                }
            }
        }
        (jobs, errors)
    }

    fn instantiate_one(&self, record: &ResourceRecord) -> Result<Job, String> {
        let src = &self.job;
        let mut job = src.clone();
        job.id = JobId::new(interpolate(&src.id, record)?);
        job.summary = interpolate(&src.summary, record)?;
        job.command = src.command.as_deref().map(|c| interpolate(c, record)).transpose()?;
        job.depends = src
            .depends
            .iter()
            .map(|d| interpolate(d, record).map(JobId::new))
            .collect::<Result<_, _>>()?;
        job.after = src
            .after
            .iter()
            .map(|d| interpolate(d, record).map(JobId::new))
            .collect::<Result<_, _>>()?;
        job.requires =
            src.requires.iter().map(|r| interpolate(r, record)).collect::<Result<_, _>>()?;
        job.template_id = Some(self.id.clone());
        Ok(job)
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
