//! Dependency resolution for the startup pass.

use std::collections::HashMap;

use tracing::warn;

use super::component::ComponentDescriptor;
use crate::error::InitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Compute a deterministic topological order over `components`.
///
/// Iterative depth-first traversal with an explicit stack. Roots are visited
/// in registration order and dependencies in declaration order, so the same
/// registrations always yield the same order. Dependencies naming
/// unregistered components are ignored.
///
/// Returns indices into `components`, dependencies first.
pub(super) fn resolve_order(components: &[ComponentDescriptor]) -> Result<Vec<usize>, InitError> {
    let index: HashMap<&str, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    let edges: Vec<Vec<usize>> = components
        .iter()
        .map(|c| {
            c.dependencies
                .iter()
                .filter_map(|dep| {
                    let resolved = index.get(dep.as_str()).copied();
                    if resolved.is_none() {
                        warn!(
                            component = %c.name,
                            dependency = %dep,
                            "Ignoring dependency on unregistered component"
                        );
                    }
                    resolved
                })
                .collect()
        })
        .collect();

    let mut marks = vec![Mark::Unvisited; components.len()];
    let mut order = Vec::with_capacity(components.len());
    // (node, cursor into its dependency list)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..components.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&dep) = edges[node].get(frame.1) else {
                marks[node] = Mark::Done;
                order.push(node);
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[dep] {
                Mark::Unvisited => {
                    marks[dep] = Mark::InProgress;
                    stack.push((dep, 0));
                }
                Mark::InProgress => {
                    let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..]
                        .iter()
                        .map(|&(n, _)| components[n].name.clone())
                        .collect();
                    cycle.push(components[dep].name.clone());
                    return Err(InitError::DependencyCycle { cycle });
                }
                Mark::Done => {}
            }
        }
    }

    Ok(order)
}
