//! Plugin dependency ordering using topological sort.
//!
//! Kahn's algorithm with cycle detection. Ready plugins are taken in
//! alphabetical order so the result is the same on every run.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::Result;

use super::error::PluginError;

/// Order plugins so every plugin comes after its dependencies.
///
/// `graph` maps a plugin name to the names it depends on.
///
/// # Errors
/// Returns error if:
/// - A plugin declares a dependency that is not a key of `graph`
/// - There is a circular dependency
pub fn resolve_load_order(graph: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    // in_degree[p] = number of dependencies of p not yet placed
    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(graph.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::with_capacity(graph.len());

    for (name, deps) in graph {
        let unique: HashSet<&str> = deps.iter().map(String::as_str).collect();

        for dep in &unique {
            if !graph.contains_key(*dep) {
                return Err(PluginError::MissingDependency {
                    plugin: name.clone(),
                    dependency: dep.to_string(),
                }
                .into());
            }
            dependents.entry(*dep).or_default().push(name.as_str());
        }

        in_degree.insert(name.as_str(), unique.len());
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(plugin) = ready.pop_first() {
        order.push(plugin.to_string());

        for dependent in dependents.get(plugin).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() != graph.len() {
        let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut in_cycle: Vec<&str> = graph
            .keys()
            .map(String::as_str)
            .filter(|k| !placed.contains(k))
            .collect();
        in_cycle.sort_unstable();

        return Err(PluginError::CircularDependency {
            cycle: in_cycle.join(", "),
        }
        .into());
    }

    Ok(order)
}

/// Check that every dependency of a plugin is available.
pub fn check_dependencies(plugin: &str, dependencies: &[String], available: &HashSet<String>) -> Result<()> {
    for dep in dependencies {
        if !available.contains(dep) {
            return Err(PluginError::MissingDependency {
                plugin: plugin.to_string(),
                dependency: dep.clone(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn graph(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    fn pos(order: &[String], name: &str) -> usize {
        order.iter().position(|x| x == name).unwrap()
    }

    #[test]
    fn independent_plugins_are_alphabetical() {
        let order = resolve_load_order(&graph(&[("c", &[]), ("a", &[]), ("b", &[])])).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn simple_chain() {
        let order =
            resolve_load_order(&graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"])])).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_dependency() {
        let order = resolve_load_order(&graph(&[
            ("d", &[]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("a", &["b", "c"]),
        ]))
        .unwrap();

        assert!(pos(&order, "d") < pos(&order, "b"));
        assert!(pos(&order, "d") < pos(&order, "c"));
        assert!(pos(&order, "b") < pos(&order, "a"));
        assert!(pos(&order, "c") < pos(&order, "a"));
    }

    #[test]
    fn duplicate_dependency_counts_once() {
        let order = resolve_load_order(&graph(&[("a", &[]), ("b", &["a", "a"])])).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn missing_dependency() {
        let err = resolve_load_order(&graph(&[("a", &["missing"])])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::MissingDependency { dependency, .. }) if dependency == "missing"
        ));
    }

    #[test]
    fn circular_dependency_names_members() {
        let err = resolve_load_order(&graph(&[
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["a"]),
            ("d", &[]),
        ]))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("circular"));
        assert!(msg.ends_with("plugins: a, b, c"));
    }

    #[test]
    fn check_dependencies_reports_missing() {
        let available: HashSet<String> = ["dep1".to_string()].into_iter().collect();
        assert!(check_dependencies("x", &["dep1".to_string()], &available).is_ok());

        let err = check_dependencies("x", &["dep1".to_string(), "gone".to_string()], &available)
            .unwrap_err();
        assert!(err.to_string().contains("gone"));
    }
}
