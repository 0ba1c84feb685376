use crate::types::{StepStatus, WorkflowStep};
use std::collections::HashMap;

/// Indices of pending steps whose prerequisites are all satisfied.
///
/// Prerequisites are the declared dependencies plus the step a guard
/// condition refers to.
pub fn ready_steps(steps: &[WorkflowStep]) -> Vec<usize> {
    let status: HashMap<&str, StepStatus> = steps.iter().map(|s| (s.id(), s.status)).collect();
    let satisfied = |id: &str| status.get(id).is_some_and(|s| s.satisfies_dependency());

    steps
        .iter()
        .enumerate()
        .filter(|(_, s)| s.status == StepStatus::Pending)
        .filter(|(_, s)| s.definition.depends_on.iter().all(|d| satisfied(d)))
        .filter(|(_, s)| {
            s.definition
                .condition
                .as_ref()
                .map_or(true, |c| satisfied(&c.step_id))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Ids of steps still pending.
pub fn pending_ids(steps: &[WorkflowStep]) -> Vec<String> {
    steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .map(|s| s.id().to_string())
        .collect()
}

/// One dependency cycle among `steps`, as a path of step ids, if any.
pub fn find_cycle(steps: &[WorkflowStep]) -> Option<Vec<String>> {
    let deps: HashMap<&str, &[String]> = steps
        .iter()
        .map(|s| (s.id(), s.definition.depends_on.as_slice()))
        .collect();
    let mut visited: HashMap<&str, u8> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();
    for step in steps {
        if dfs_cycle(step.id(), &deps, &mut visited, &mut path) {
            return Some(path.into_iter().map(str::to_string).collect());
        }
    }
    None
}

fn dfs_cycle<'a>(
    id: &'a str,
    deps: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashMap<&'a str, u8>,
    path: &mut Vec<&'a str>,
) -> bool {
    match visited.get(id) {
        Some(1) => {
            // back edge: keep only the cycle itself
            if let Some(start) = path.iter().position(|p| *p == id) {
                path.drain(..start);
            }
            path.push(id);
            return true;
        }
        Some(2) => return false,
        _ => {}
    }
    visited.insert(id, 1);
    path.push(id);
    if let Some(children) = deps.get(id) {
        for dep in *children {
            if dfs_cycle(dep.as_str(), deps, visited, path) {
                return true;
            }
        }
    }
    path.pop();
    visited.insert(id, 2);
    false
}
