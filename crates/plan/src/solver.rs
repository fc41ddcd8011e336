// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency solver.
//!
//! Depth-first search with white/gray/black colouring over the desired
//! jobs in order. The post-order is the run order, so every job follows its
//! dependencies and ties keep declaration order. Jobs on a cycle, jobs with
//! missing dependencies and everything that hard-depends on them are
//! dropped and reported.

use crate::resolve::Problem;
use cb_core::{Job, JobId};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

#[derive(Debug, Default)]
pub struct Solution {
    pub order: Vec<JobId>,
    pub problems: Vec<Problem>,
}

pub fn solve(pool: &IndexMap<JobId, Job>, desired: &[JobId]) -> Solution {
    let mut problems = Vec::new();
    let mut broken: HashSet<JobId> = HashSet::new();

    // Hard-dependency closure
    let mut closure: IndexSet<JobId> = IndexSet::new();
    let mut stack: Vec<JobId> = desired.iter().rev().cloned().collect();
    while let Some(id) = stack.pop() {
        if !closure.insert(id.clone()) {
            continue;
        }
        let Some(job) = pool.get(&id) else { continue };
        for dep in job.hard_dependencies() {
            if pool.contains_key(&dep) {
                stack.push(dep);
            } else {
                problems.push(Problem::MissingDependency { job: id.clone(), dependency: dep });
                broken.insert(id.clone());
            }
        }
    }

    let mut dfs = Dfs {
        pool,
        closure: &closure,
        color: HashMap::new(),
        path: Vec::new(),
        order: Vec::new(),
        cycles: Vec::new(),
    };
    for id in desired {
        if pool.contains_key(id) {
            dfs.visit(id);
        }
    }
    let Dfs { order, cycles, .. } = dfs;

    for cycle in cycles {
        broken.extend(cycle.iter().cloned());
        problems.push(Problem::DependencyCycle { jobs: cycle });
    }

    let mut removed: HashSet<JobId> = HashSet::new();
    let mut kept = Vec::with_capacity(order.len());
    for id in order {
        if broken.contains(&id) {
            removed.insert(id);
            continue;
        }
        let failed_dep = pool
            .get(&id)
            .and_then(|job| job.hard_dependencies().into_iter().find(|d| removed.contains(d)));
        match failed_dep {
            Some(dependency) => {
                problems.push(Problem::DependsOnRemoved { job: id.clone(), dependency });
                removed.insert(id);
            }
            None => kept.push(id),
        }
    }

    Solution { order: kept, problems }
}

struct Dfs<'a> {
    pool: &'a IndexMap<JobId, Job>,
    closure: &'a IndexSet<JobId>,
    color: HashMap<JobId, Color>,
    path: Vec<JobId>,
    order: Vec<JobId>,
    cycles: Vec<Vec<JobId>>,
}

impl Dfs<'_> {
    fn visit(&mut self, id: &JobId) {
        match self.color.get(id) {
            Some(Color::Black) => return,
            Some(Color::Gray) => {
                let start = self.path.iter().position(|p| p == id).unwrap_or(0);
                let mut cycle = self.path[start..].to_vec();
                cycle.push(id.clone());
                self.cycles.push(cycle);
                return;
            }
            None => {}
        }
        let Some(job) = self.pool.get(id) else { return };

        self.color.insert(id.clone(), Color::Gray);
        self.path.push(id.clone());
        let ordering = job.after.iter().filter(|d| self.closure.contains(*d)).cloned();
        let edges: Vec<JobId> = job
            .hard_dependencies()
            .into_iter()
            .filter(|d| self.pool.contains_key(d))
            .chain(ordering)
            .collect();
        for dep in &edges {
            self.visit(dep);
        }
        self.path.pop();
        self.color.insert(id.clone(), Color::Black);
        self.order.push(id.clone());
    }
}

#[cfg(test)]
#[path = "solver_tests.rs"]
mod tests;
