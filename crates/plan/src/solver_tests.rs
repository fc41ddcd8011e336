// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cb_core::test_support::strategies::arb_dag;
use cb_core::test_support::{resource_job, shell_job};
use proptest::prelude::*;

fn pool(jobs: Vec<Job>) -> IndexMap<JobId, Job> {
    jobs.into_iter().map(|j| (j.id.clone(), j)).collect()
}

fn ids(list: &[&str]) -> Vec<JobId> {
    list.iter().map(|s| JobId::new(*s)).collect()
}

#[test]
fn dependencies_run_first() {
    let jobs = pool(vec![
        shell_job("t::a", &["t::b"]),
        shell_job("t::b", &["t::c"]),
        resource_job("t::c"),
    ]);
    let solution = solve(&jobs, &ids(&["t::a", "t::b", "t::c"]));
    assert_eq!(solution.order, ids(&["t::c", "t::b", "t::a"]));
    assert!(solution.problems.is_empty());
}

#[test]
fn independent_jobs_keep_desired_order() {
    let jobs = pool(vec![shell_job("t::x", &[]), shell_job("t::y", &[]), shell_job("t::z", &[])]);
    let solution = solve(&jobs, &ids(&["t::z", "t::x", "t::y"]));
    assert_eq!(solution.order, ids(&["t::z", "t::x", "t::y"]));
}

#[test]
fn dependencies_outside_desired_are_pulled_in() {
    let jobs = pool(vec![shell_job("t::a", &["t::dep"]), shell_job("t::dep", &[])]);
    let solution = solve(&jobs, &ids(&["t::a"]));
    assert_eq!(solution.order, ids(&["t::dep", "t::a"]));
}

#[test]
fn resource_requirements_are_dependencies() {
    let mut job = shell_job("t::a", &[]);
    job.requires = vec!["device.category == 'DISK'".to_string()];
    let jobs = pool(vec![job, resource_job("t::device")]);
    let solution = solve(&jobs, &ids(&["t::a"]));
    assert_eq!(solution.order, ids(&["t::device", "t::a"]));
}

#[test]
fn after_only_orders_jobs_already_selected() {
    let mut a = shell_job("t::a", &[]);
    a.after = ids(&["t::b", "t::unselected"]);
    let jobs = pool(vec![a, shell_job("t::b", &[]), shell_job("t::unselected", &[])]);

    let solution = solve(&jobs, &ids(&["t::a", "t::b"]));
    assert_eq!(solution.order, ids(&["t::b", "t::a"]));
    assert!(solution.problems.is_empty());
}

#[test]
fn missing_dependency_removes_job_and_dependents() {
    let jobs = pool(vec![
        shell_job("t::a", &["t::gone"]),
        shell_job("t::b", &["t::a"]),
        shell_job("t::c", &[]),
    ]);
    let solution = solve(&jobs, &ids(&["t::b", "t::c"]));
    assert_eq!(solution.order, ids(&["t::c"]));
    assert!(solution.problems.contains(&Problem::MissingDependency {
        job: JobId::new("t::a"),
        dependency: JobId::new("t::gone"),
    }));
    assert!(solution.problems.contains(&Problem::DependsOnRemoved {
        job: JobId::new("t::b"),
        dependency: JobId::new("t::a"),
    }));
}

#[test]
fn cycle_is_reported_with_its_trail() {
    let jobs = pool(vec![
        shell_job("t::a", &["t::b"]),
        shell_job("t::b", &["t::c"]),
        shell_job("t::c", &["t::b"]),
        shell_job("t::d", &[]),
    ]);
    let solution = solve(&jobs, &ids(&["t::a", "t::d"]));
    assert_eq!(solution.order, ids(&["t::d"]));

    let cycle = solution
        .problems
        .iter()
        .find_map(|p| match p {
            Problem::DependencyCycle { jobs } => Some(jobs.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(cycle, ids(&["t::b", "t::c", "t::b"]));
}

fn dag_pool(dag: &[Vec<usize>]) -> IndexMap<JobId, Job> {
    pool(dag
        .iter()
        .enumerate()
        .map(|(i, deps)| {
            let deps: Vec<String> = deps.iter().map(|d| format!("t::j{d}")).collect();
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
            shell_job(&format!("t::j{i}"), &deps)
        })
        .collect())
}

proptest! {
    #[test]
    fn order_is_topological(dag in arb_dag(12), pick in proptest::collection::vec(any::<bool>(), 12)) {
        let jobs = dag_pool(&dag);
        let desired: Vec<JobId> = jobs
            .keys()
            .enumerate()
            .filter(|(i, _)| pick[*i])
            .map(|(_, id)| id.clone())
            .collect();
        let solution = solve(&jobs, &desired);
        prop_assert!(solution.problems.is_empty());

        let position = |id: &JobId| solution.order.iter().position(|o| o == id);
        for id in &desired {
            prop_assert!(position(id).is_some());
        }
        for id in &solution.order {
            let me = position(id);
            for dep in &jobs[id].depends {
                let theirs = position(dep);
                prop_assert!(theirs.is_some(), "dependency {} missing", dep);
                prop_assert!(theirs < me);
            }
        }
    }
}
