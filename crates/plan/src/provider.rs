// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider files and the [`ProviderSet`] built from them.
//!
//! A provider file declares a `namespace` and any number of `[[job]]`,
//! `[[template]]` and `[[test_plan]]` tables. Partial ids are qualified with
//! the file's namespace. Declaration order is preserved.

use crate::find::collect_provider_files;
use crate::template::Template;
use crate::testplan::{IncludeEntry, StatusOverride, TestPlan};
use cb_core::{CertificationStatus, Job, JobId, JobKind, NAMESPACE_SEP};
use indexmap::IndexMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid provider {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("job {id} defined in both {first} and {second}")]
    DuplicateJob { id: JobId, first: String, second: String },
    #[error("test plan {0} defined more than once")]
    DuplicateTestPlan(String),
    #[error("job {0} has no command")]
    MissingCommand(JobId),
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    namespace: String,
    #[serde(default, rename = "job")]
    jobs: Vec<RawJob>,
    #[serde(default, rename = "template")]
    templates: Vec<RawTemplate>,
    #[serde(default, rename = "test_plan")]
    test_plans: Vec<RawTestPlan>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    id: String,
    #[serde(default = "default_kind")]
    kind: JobKind,
    command: Option<String>,
    #[serde(default)]
    summary: String,
    category: Option<String>,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    after: Vec<String>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    imports: BTreeMap<String, String>,
    estimated_duration: Option<f64>,
    timeout: Option<u64>,
    user: Option<String>,
    #[serde(default)]
    environ: Vec<String>,
    #[serde(default)]
    certification_status: CertificationStatus,
}

fn default_kind() -> JobKind {
    JobKind::Shell
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    template_resource: String,
    template_filter: Option<String>,
    template_id: Option<String>,
    #[serde(flatten)]
    job: RawJob,
}

#[derive(Debug, Deserialize)]
struct RawTestPlan {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    mandatory_include: Vec<String>,
    #[serde(default)]
    bootstrap_include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    nested_part: Vec<String>,
    #[serde(default)]
    certification_status_overrides: Vec<StatusOverride>,
}

impl RawJob {
    fn into_job(self, ns: &str, origin: &str) -> Result<Job, LoadError> {
        let id = JobId::qualified(ns, &self.id);
        if self.kind != JobKind::Manual && self.command.is_none() {
            return Err(LoadError::MissingCommand(id));
        }
        let qualify = |ids: Vec<String>| -> Vec<JobId> {
            ids.iter().map(|d| JobId::qualified(ns, d.trim())).collect()
        };
        Ok(Job {
            id,
            kind: self.kind,
            command: self.command,
            summary: self.summary,
            category: self.category,
            depends: qualify(self.depends),
            after: qualify(self.after),
            requires: self.requires,
            imports: self
                .imports
                .into_iter()
                .map(|(alias, id)| (alias, JobId::qualified(ns, &id)))
                .collect(),
            estimated_duration: self.estimated_duration,
            timeout: self.timeout,
            user: self.user,
            environ: self.environ,
            certification_status: self.certification_status,
            template_id: None,
            origin: Some(origin.to_string()),
        })
    }
}

/// Every job, template and test plan available to a session.
///
/// Built once and passed explicitly to the resolver; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProviderSet {
    jobs: IndexMap<JobId, Job>,
    templates: Vec<Template>,
    test_plans: IndexMap<String, TestPlan>,
    skipped: Vec<(PathBuf, String)>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every provider file under `dirs`.
    ///
    /// Files that fail to parse are skipped with a warning and listed in
    /// [`ProviderSet::skipped`]; conflicting definitions are an error.
    pub fn load(dirs: &[PathBuf]) -> Result<Self, LoadError> {
        let mut set = Self::new();
        for dir in dirs {
            let files = collect_provider_files(dir)
                .map_err(|source| LoadError::Io { path: dir.clone(), source })?;
            for path in files {
                let content = std::fs::read_to_string(&path)
                    .map_err(|source| LoadError::Io { path: path.clone(), source })?;
                match set.add_provider_str(&content, &path.display().to_string()) {
                    Ok(()) => {}
                    Err(e @ (LoadError::Parse { .. } | LoadError::MissingCommand(_))) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping invalid provider");
                        set.skipped.push((path, e.to_string()));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        tracing::info!(
            jobs = set.jobs.len(),
            templates = set.templates.len(),
            test_plans = set.test_plans.len(),
            "providers loaded"
        );
        Ok(set)
    }

    /// Parse one provider file and merge it in. Nothing is merged on error.
    pub fn add_provider_str(&mut self, content: &str, origin: &str) -> Result<(), LoadError> {
        let raw: RawProvider = toml::from_str(content)
            .map_err(|e| LoadError::Parse { origin: origin.to_string(), message: e.to_string() })?;
        let ns = raw.namespace.trim();

        let jobs = raw
            .jobs
            .into_iter()
            .map(|j| j.into_job(ns, origin))
            .collect::<Result<Vec<_>, _>>()?;
        let templates = raw
            .templates
            .into_iter()
            .map(|t| {
                let template_id = t.template_id.clone().unwrap_or_else(|| t.job.id.clone());
                Ok(Template {
                    id: JobId::qualified(ns, &template_id).to_string(),
                    resource: JobId::qualified(ns, &t.template_resource),
                    filter: t.template_filter,
                    job: t.job.into_job(ns, origin)?,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;
        let plans = raw
            .test_plans
            .into_iter()
            .map(|p| {
                let include = p
                    .include
                    .iter()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| IncludeEntry::parse(line))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|message| LoadError::Parse { origin: origin.to_string(), message })?;
                Ok(TestPlan {
                    id: JobId::qualified(ns, &p.id).to_string(),
                    name: p.name,
                    include,
                    mandatory_include: p.mandatory_include,
                    bootstrap_include: p.bootstrap_include,
                    exclude: p.exclude,
                    nested_part: p
                        .nested_part
                        .iter()
                        .map(|n| JobId::qualified(ns, n).to_string())
                        .collect(),
                    certification_status_overrides: p.certification_status_overrides,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        let mut seen = std::collections::HashSet::new();
        for job in &jobs {
            self.check_job_free(&job.id, origin)?;
            if !seen.insert(&job.id) {
                return Err(LoadError::DuplicateJob {
                    id: job.id.clone(),
                    first: origin.to_string(),
                    second: origin.to_string(),
                });
            }
        }
        for plan in &plans {
            if self.test_plans.contains_key(&plan.id) {
                return Err(LoadError::DuplicateTestPlan(plan.id.clone()));
            }
        }
        for job in jobs {
            self.jobs.insert(job.id.clone(), job);
        }
        self.templates.extend(templates);
        for plan in plans {
            self.test_plans.insert(plan.id.clone(), plan);
        }
        Ok(())
    }

    fn check_job_free(&self, id: &JobId, origin: &str) -> Result<(), LoadError> {
        match self.jobs.get(id) {
            Some(existing) => Err(LoadError::DuplicateJob {
                id: id.clone(),
                first: existing.origin.clone().unwrap_or_default(),
                second: origin.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn add_job(&mut self, job: Job) -> Result<(), LoadError> {
        self.check_job_free(&job.id, job.origin.as_deref().unwrap_or_default())?;
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    pub fn add_template(&mut self, template: Template) {
        self.templates.push(template);
    }

    pub fn add_test_plan(&mut self, plan: TestPlan) -> Result<(), LoadError> {
        if self.test_plans.contains_key(&plan.id) {
            return Err(LoadError::DuplicateTestPlan(plan.id));
        }
        self.test_plans.insert(plan.id.clone(), plan);
        Ok(())
    }

    pub fn jobs(&self) -> &IndexMap<JobId, Job> {
        &self.jobs
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn test_plans(&self) -> impl Iterator<Item = &TestPlan> {
        self.test_plans.values()
    }

    /// Look a plan up by full id, or by partial id when that is unambiguous.
    pub fn test_plan(&self, id: &str) -> Option<&TestPlan> {
        if let Some(plan) = self.test_plans.get(id) {
            return Some(plan);
        }
        let suffix = format!("{NAMESPACE_SEP}{id}");
        let mut found = self.test_plans.values().filter(|p| p.id.ends_with(&suffix));
        match (found.next(), found.next()) {
            (Some(plan), None) => Some(plan),
            _ => None,
        }
    }

    /// Provider files skipped during [`ProviderSet::load`].
    pub fn skipped(&self) -> &[(PathBuf, String)] {
        &self.skipped
    }

    /// Digest of all job and template definitions.
    ///
    /// Stored with a session so a resume against changed providers can be
    /// detected.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for job in self.jobs.values() {
            if let Ok(bytes) = serde_json::to_vec(job) {
                hasher.update(&bytes);
            }
        }
        for template in &self.templates {
            if let Ok(bytes) = serde_json::to_vec(template) {
                hasher.update(&bytes);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
