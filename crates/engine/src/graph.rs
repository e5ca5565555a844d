//! Dependency graph helpers shared by the registry and the scheduler
//!
//! Graphs are adjacency maps from a node to the nodes it depends on.

use std::collections::{HashMap, HashSet, VecDeque};

/// Node name to the names it depends on
pub(crate) type DependencyMap<'a> = HashMap<&'a str, Vec<&'a str>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Find a dependency cycle, visiting nodes in the given order
///
/// The returned path starts and ends with the same node.
pub(crate) fn find_cycle<'a>(nodes: &[&'a str], deps: &DependencyMap<'a>) -> Option<Vec<String>> {
    let mut marks: HashMap<&'a str, Mark> = nodes.iter().map(|n| (*n, Mark::Unvisited)).collect();
    let mut path: Vec<&'a str> = Vec::new();

    for node in nodes {
        if marks.get(node) == Some(&Mark::Unvisited)
            && let Some(cycle) = visit(*node, deps, &mut marks, &mut path)
        {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    deps: &DependencyMap<'a>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    marks.insert(node, Mark::OnStack);
    path.push(node);

    for next in deps.get(node).map(Vec::as_slice).unwrap_or_default() {
        match marks.get(next).copied().unwrap_or(Mark::Done) {
            Mark::OnStack => {
                let start = path.iter().position(|n| n == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(ToString::to_string).collect();
                cycle.push((*next).to_string());
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(*next, deps, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
    None
}

/// Invert a dependency map: node to the nodes that depend on it directly
pub(crate) fn reverse<'a>(deps: &DependencyMap<'a>) -> DependencyMap<'a> {
    let mut reversed: DependencyMap<'a> = HashMap::new();
    for (node, targets) in deps {
        for target in targets {
            reversed.entry(*target).or_default().push(*node);
        }
    }
    reversed
}

/// Every node reachable from `start` through `edges`, excluding `start`
pub(crate) fn reachable<'a>(start: &'a str, edges: &DependencyMap<'a>) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for next in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
            if *next != start && seen.insert(*next) {
                queue.push_back(*next);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn graph<'a>(edges: &[(&'a str, &[&'a str])]) -> DependencyMap<'a> {
        edges
            .iter()
            .map(|(node, deps)| (*node, deps.to_vec()))
            .collect()
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let deps = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        assert_eq!(find_cycle(&["a", "b", "c"], &deps), None);
    }

    #[test]
    fn test_cycle_path_is_closed() {
        let deps = graph(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
        let cycle = find_cycle(&["a", "b", "c"], &deps).unwrap();
        assert_eq!(cycle, vec!["a", "c", "b", "a"]);
    }

    #[test]
    fn test_reachable_through_reversed_edges() {
        let deps = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let dependents = reverse(&deps);

        let from_a = reachable("a", &dependents);
        assert_eq!(from_a, HashSet::from(["b", "c"]));
        assert!(reachable("d", &dependents).is_empty());
    }
}
