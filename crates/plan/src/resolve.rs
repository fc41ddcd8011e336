// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn a test plan and an operator selection into a run list.
//!
//! Selection order:
//! 1. `mandatory_include` matches, always first and never excluded
//! 2. `bootstrap_include` jobs
//! 3. `include` matches, minus `exclude`, narrowed by `match`
//!
//! Dependencies of selected jobs are pulled in even when an exclude pattern
//! names them. Every rejected piece of input ends up in
//! [`Resolution::problems`]; only an empty result is an error.

use crate::provider::ProviderSet;
use crate::solver::solve;
use crate::testplan::{IdPattern, TestPlan};
pub use cb_core::Selection;
use cb_core::{CertificationStatus, Job, JobId, ResourceRecord};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Something the resolver dropped or could not make sense of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Problem {
    PatternNeverMatched { pattern: String },
    BadPattern { pattern: String, error: String },
    UnknownJob { id: JobId },
    UnknownNestedPart { plan: String },
    MissingDependency { job: JobId, dependency: JobId },
    DependencyCycle { jobs: Vec<JobId> },
    DependsOnRemoved { job: JobId, dependency: JobId },
    DuplicateId { id: JobId },
    Template { template: String, error: String },
    BadRequirement { job: JobId, error: String },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::PatternNeverMatched { pattern } => {
                write!(f, "pattern '{pattern}' did not match any job")
            }
            Problem::BadPattern { pattern, error } => write!(f, "bad pattern '{pattern}': {error}"),
            Problem::UnknownJob { id } => write!(f, "unknown job {id}"),
            Problem::UnknownNestedPart { plan } => write!(f, "unknown nested test plan {plan}"),
            Problem::MissingDependency { job, dependency } => {
                write!(f, "{job} depends on unknown job {dependency}")
            }
            Problem::DependencyCycle { jobs } => {
                let trail: Vec<&str> = jobs.iter().map(|j| j.as_str()).collect();
                write!(f, "dependency cycle: {}", trail.join(" -> "))
            }
            Problem::DependsOnRemoved { job, dependency } => {
                write!(f, "{job} dropped because {dependency} was dropped")
            }
            Problem::DuplicateId { id } => write!(f, "duplicate job id {id}"),
            Problem::Template { error, .. } => write!(f, "{error}"),
            Problem::BadRequirement { job, error } => {
                write!(f, "{job} has an invalid requirement: {error}")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown test plan {0}")]
    UnknownPlan(String),
    #[error("selection resolved to no jobs ({} problems)", problems.len())]
    Empty { problems: Vec<Problem> },
}

/// Output of [`resolve`] and [`bootstrap_list`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Dependency-ordered jobs to run.
    pub run_list: Vec<JobId>,
    /// What was explicitly selected, before dependencies.
    pub desired: Vec<JobId>,
    /// Definitions for every run-list job, certification overrides applied.
    pub jobs: IndexMap<JobId, Job>,
    pub problems: Vec<Problem>,
}

/// Test plan with nested parts merged and patterns compiled.
#[derive(Default)]
struct Effective {
    include: Vec<(IdPattern, Option<CertificationStatus>)>,
    mandatory: Vec<IdPattern>,
    bootstrap: Vec<JobId>,
    exclude: Vec<IdPattern>,
    matching: Vec<IdPattern>,
    overrides: Vec<(IdPattern, CertificationStatus)>,
}

impl Effective {
    fn build(
        providers: &ProviderSet,
        plan: &TestPlan,
        selection: &Selection,
        problems: &mut Vec<Problem>,
    ) -> Self {
        let mut eff = Self::default();
        let mut visited = HashSet::new();
        eff.merge(providers, plan, &mut visited, problems);

        let ns = plan.namespace();
        for pattern in &selection.include {
            if let Some(p) = compile(ns, pattern, problems) {
                eff.include.push((p, None));
            }
        }
        let excluded: Vec<_> = selection.exclude.iter().filter_map(|p| compile(ns, p, problems)).collect();
        eff.exclude.extend(excluded);
        eff.matching = selection.matching.iter().filter_map(|p| compile(ns, p, problems)).collect();
        eff
    }

    fn merge(
        &mut self,
        providers: &ProviderSet,
        plan: &TestPlan,
        visited: &mut HashSet<String>,
        problems: &mut Vec<Problem>,
    ) {
        if !visited.insert(plan.id.clone()) {
            return;
        }
        let ns = plan.namespace();
        for entry in &plan.include {
            if let Some(p) = compile(ns, &entry.pattern, problems) {
                self.include.push((p, entry.certification_status));
            }
        }
        self.mandatory
            .extend(plan.mandatory_include.iter().filter_map(|p| compile(ns, p, problems)));
        for id in plan.bootstrap_ids() {
            if !self.bootstrap.contains(&id) {
                self.bootstrap.push(id);
            }
        }
        self.exclude.extend(plan.exclude.iter().filter_map(|p| compile(ns, p, problems)));
        for o in &plan.certification_status_overrides {
            if let Some(p) = compile(ns, &o.pattern, problems) {
                self.overrides.push((p, o.status));
            }
        }
        for nested in &plan.nested_part {
            match providers.test_plan(nested) {
                Some(part) => self.merge(providers, part, visited, problems),
                None => problems.push(Problem::UnknownNestedPart { plan: nested.clone() }),
            }
        }
    }
}

fn compile(ns: &str, pattern: &str, problems: &mut Vec<Problem>) -> Option<IdPattern> {
    match IdPattern::new(ns, pattern) {
        Ok(p) => Some(p),
        Err(e) => {
            problems.push(Problem::BadPattern { pattern: pattern.to_string(), error: e.to_string() });
            None
        }
    }
}

/// A pattern names a job by its id or, for template instances, the template id.
fn hits(pattern: &IdPattern, job: &Job) -> bool {
    pattern.matches(job.id.as_str()) || job.template_id.as_deref().is_some_and(|t| pattern.matches(t))
}

/// Provider jobs plus every template instantiated against known records.
fn candidate_pool(
    providers: &ProviderSet,
    resources: &IndexMap<JobId, Vec<ResourceRecord>>,
    problems: &mut Vec<Problem>,
) -> IndexMap<JobId, Job> {
    let mut pool = providers.jobs().clone();
    for template in providers.templates() {
        let Some(records) = resources.get(&template.resource) else {
            continue;
        };
        let (jobs, errors) = template.instantiate(records);
        problems.extend(
            errors
                .into_iter()
                .map(|e| Problem::Template { template: template.id.clone(), error: e.to_string() }),
        );
        for job in jobs {
            if pool.contains_key(&job.id) {
                problems.push(Problem::DuplicateId { id: job.id });
                continue;
            }
            pool.insert(job.id.clone(), job);
        }
    }
    pool
}

/// Resolve `plan_id` against the providers and any resource records
/// collected so far.
pub fn resolve(
    providers: &ProviderSet,
    plan_id: &str,
    selection: &Selection,
    resources: &IndexMap<JobId, Vec<ResourceRecord>>,
) -> Result<Resolution, ResolveError> {
    let plan =
        providers.test_plan(plan_id).ok_or_else(|| ResolveError::UnknownPlan(plan_id.to_string()))?;
    let mut problems = Vec::new();
    let eff = Effective::build(providers, plan, selection, &mut problems);
    let pool = candidate_pool(providers, resources, &mut problems);

    let mut desired: IndexSet<JobId> = IndexSet::new();
    for pattern in &eff.mandatory {
        let mut matched = false;
        for job in pool.values().filter(|j| hits(pattern, j)) {
            matched = true;
            desired.insert(job.id.clone());
        }
        if !matched {
            problems.push(Problem::PatternNeverMatched { pattern: pattern.as_str().to_string() });
        }
    }
    for id in &eff.bootstrap {
        if pool.contains_key(id) {
            desired.insert(id.clone());
        } else {
            problems.push(Problem::UnknownJob { id: id.clone() });
        }
    }

    let mut match_used = vec![false; eff.matching.len()];
    for (pattern, _) in &eff.include {
        let mut matched = false;
        for job in pool.values().filter(|j| hits(pattern, j)) {
            matched = true;
            if eff.exclude.iter().any(|x| hits(x, job)) {
                continue;
            }
            if !eff.matching.is_empty() {
                let mut kept = false;
                for (i, m) in eff.matching.iter().enumerate() {
                    if hits(m, job) {
                        match_used[i] = true;
                        kept = true;
                    }
                }
                if !kept {
                    continue;
                }
            }
            desired.insert(job.id.clone());
        }
        if !matched && !template_pending(providers, resources, pattern) {
            problems.push(Problem::PatternNeverMatched { pattern: pattern.as_str().to_string() });
        }
    }
    for (m, used) in eff.matching.iter().zip(&match_used) {
        if !used {
            problems.push(Problem::PatternNeverMatched { pattern: m.as_str().to_string() });
        }
    }

    let desired: Vec<JobId> = desired.into_iter().collect();
    let solution = solve(&pool, &desired);
    problems.extend(solution.problems);

    let mut jobs = IndexMap::new();
    for id in &solution.order {
        let Some(job) = pool.get(id) else { continue };
        let mut job = job.clone();
        if let Err(e) = job.requirements() {
            problems.push(Problem::BadRequirement { job: id.clone(), error: e.to_string() });
        }
        for (pattern, status) in &eff.include {
            if let Some(status) = status {
                if hits(pattern, &job) {
                    job.certification_status = *status;
                }
            }
        }
        for (pattern, status) in &eff.overrides {
            if hits(pattern, &job) {
                job.certification_status = *status;
            }
        }
        jobs.insert(id.clone(), job);
    }

    if solution.order.is_empty() {
        return Err(ResolveError::Empty { problems });
    }
    tracing::debug!(
        plan = %plan.id,
        run_list = solution.order.len(),
        problems = problems.len(),
        "resolved test plan"
    );
    Ok(Resolution { run_list: solution.order, desired, jobs, problems })
}

/// Templates whose resource has not produced records yet cannot match.
fn template_pending(
    providers: &ProviderSet,
    resources: &IndexMap<JobId, Vec<ResourceRecord>>,
    pattern: &IdPattern,
) -> bool {
    providers
        .templates()
        .iter()
        .any(|t| pattern.matches(&t.id) && !resources.contains_key(&t.resource))
}

/// Jobs to run before template expansion: `bootstrap_include` plus the
/// resource jobs of any selected template, with their dependencies.
///
/// Bootstrap jobs are never excluded, matching [`resolve`].
///
/// An empty list is not an error; the plan may have nothing to bootstrap.
pub fn bootstrap_list(
    providers: &ProviderSet,
    plan_id: &str,
    selection: &Selection,
) -> Result<Resolution, ResolveError> {
    let plan =
        providers.test_plan(plan_id).ok_or_else(|| ResolveError::UnknownPlan(plan_id.to_string()))?;
    let mut problems = Vec::new();
    let eff = Effective::build(providers, plan, selection, &mut problems);
    let pool = providers.jobs();

    let mut desired: IndexSet<JobId> = IndexSet::new();
    for id in &eff.bootstrap {
        if pool.contains_key(id) {
            desired.insert(id.clone());
        } else {
            problems.push(Problem::UnknownJob { id: id.clone() });
        }
    }
    for template in providers.templates() {
        let selected = eff.include.iter().any(|(p, _)| p.matches(&template.id))
            && !eff.exclude.iter().any(|x| x.matches(&template.id));
        if selected && pool.contains_key(&template.resource) {
            desired.insert(template.resource.clone());
        }
    }

    let desired: Vec<JobId> = desired.into_iter().collect();
    let solution = solve(pool, &desired);
    problems.extend(solution.problems);
    let jobs =
        solution.order.iter().filter_map(|id| pool.get(id).map(|j| (id.clone(), j.clone()))).collect();
    Ok(Resolution { run_list: solution.order, desired, jobs, problems })
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
