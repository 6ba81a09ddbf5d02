//! Target graph construction and ordering

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, instrument};

use crate::target::Target;

/// Errors during graph construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A target with this name was already declared
    #[error("Target '{0}' is already declared")]
    DuplicateName(String),

    /// The declaration would close a dependency loop
    #[error("Cyclic dependency detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// The target being modified does not exist
    #[error("Target '{0}' is not declared")]
    UnknownTarget(String),

    /// A dependency names a target that was never declared
    #[error("Target '{target}' depends on undeclared target '{dependency}'")]
    UnknownDependency { target: String, dependency: String },
}

/// Directed acyclic graph of targets, kept in declaration order
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    /// Targets in declaration order
    targets: Vec<Target>,
    /// Name -> declaration index
    index: HashMap<String, usize>,
}

impl TargetGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a target.
    ///
    /// Upstream names may refer to targets declared later. Fails without
    /// modifying the graph if the name is taken or the new edges close a cycle.
    #[instrument(skip_all, fields(target_name = %target.name))]
    pub fn add_target(&mut self, mut target: Target) -> Result<(), GraphError> {
        if self.index.contains_key(&target.name) {
            return Err(GraphError::DuplicateName(target.name));
        }

        let mut seen = HashSet::new();
        target.depends_on.retain(|dep| seen.insert(dep.clone()));

        let name = target.name.clone();
        self.index.insert(name.clone(), self.targets.len());
        self.targets.push(target);

        if let Some(cycle) = self.find_cycle_through(&name) {
            self.targets.pop();
            self.index.remove(&name);
            return Err(GraphError::CycleDetected { cycle });
        }

        debug!(targets = self.targets.len(), "target declared");
        Ok(())
    }

    /// Add a single dependency edge `name -> upstream`.
    ///
    /// Fails without modifying the graph if the edge would close a cycle.
    pub fn add_dependency(&mut self, name: &str, upstream: &str) -> Result<(), GraphError> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| GraphError::UnknownTarget(name.to_string()))?;

        if self.targets[idx].depends_on.iter().any(|d| d == upstream) {
            return Ok(());
        }

        self.targets[idx].depends_on.push(upstream.to_string());
        if let Some(cycle) = self.find_cycle_through(name) {
            self.targets[idx].depends_on.pop();
            return Err(GraphError::CycleDetected { cycle });
        }

        Ok(())
    }

    /// A dependency path from `start` back to itself, if one exists.
    ///
    /// The graph is acyclic before each mutation, so any new cycle must pass
    /// through the node whose edges just changed.
    fn find_cycle_through(&self, start: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = vec![start.to_string()];
        if self.walk_back_to(start, start, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn walk_back_to(
        &self,
        current: &str,
        start: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        let Some(target) = self.get(current) else {
            return false;
        };

        for dep in &target.depends_on {
            if dep == start {
                path.push(start.to_string());
                return true;
            }
            if visited.insert(dep.clone()) {
                path.push(dep.clone());
                if self.walk_back_to(dep, start, visited, path) {
                    return true;
                }
                path.pop();
            }
        }

        false
    }

    /// Check that every dependency is declared
    pub fn validate(&self) -> Result<(), GraphError> {
        for target in &self.targets {
            for dep in &target.depends_on {
                if !self.index.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        target: target.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Dependencies-first order; ties go to the earlier declaration
    #[instrument(skip_all, fields(targets = self.targets.len()))]
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        self.validate()?;

        let mut in_degree: Vec<usize> = self.targets.iter().map(|t| t.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.targets.len()];
        for (idx, target) in self.targets.iter().enumerate() {
            for dep in &target.depends_on {
                dependents[self.index[dep]].push(idx);
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| idx)
            .collect();
        let mut sorted = Vec::with_capacity(self.targets.len());

        while let Some(idx) = ready.pop_first() {
            sorted.push(self.targets[idx].name.clone());
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if sorted.len() != self.targets.len() {
            let placed: HashSet<&str> = sorted.iter().map(String::as_str).collect();
            let cycle = self
                .targets
                .iter()
                .map(|t| t.name.clone())
                .filter(|name| !placed.contains(name.as_str()))
                .collect();
            return Err(GraphError::CycleDetected { cycle });
        }

        Ok(sorted)
    }

    /// Targets grouped by depth: wave 0 has no dependencies, wave n depends
    /// on something in wave n-1
    pub fn waves(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let sorted = self.topological_order()?;
        let mut wave_of: HashMap<&str, usize> = HashMap::new();

        for name in &sorted {
            let wave = self.targets[self.index[name]]
                .depends_on
                .iter()
                .filter_map(|dep| wave_of.get(dep.as_str()))
                .max()
                .map(|w| w + 1)
                .unwrap_or(0);
            wave_of.insert(name.as_str(), wave);
        }

        let wave_count = wave_of.values().max().map_or(0, |w| w + 1);
        let mut waves = vec![Vec::new(); wave_count];
        for name in &sorted {
            waves[wave_of[name.as_str()]].push(name.clone());
        }
        Ok(waves)
    }

    /// Targets that consume `name`'s result directly, in declaration order
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| t.depends_on.iter().any(|d| d == name))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Every target that depends on `name`, transitively
    pub fn descendants(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![name.to_string()];

        while let Some(current) = stack.pop() {
            for dependent in self.dependents(&current) {
                if found.insert(dependent.to_string()) {
                    stack.push(dependent.to_string());
                }
            }
        }

        found
    }

    /// Direct upstream targets of `name`
    pub fn upstream(&self, name: &str) -> &[String] {
        self.get(name).map(|t| t.depends_on.as_slice()).unwrap_or(&[])
    }

    /// Get a target by name
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.index.get(name).map(|&idx| &self.targets[idx])
    }

    /// Whether a target is declared
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Targets in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    /// Number of targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the graph has no targets
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Human-readable summary of the execution plan
    pub fn execution_plan(&self) -> Result<String, GraphError> {
        let mut plan = String::new();
        for (i, wave) in self.waves()?.iter().enumerate() {
            plan.push_str(&format!("Wave {} ({} targets):\n", i, wave.len()));
            for name in wave {
                if let Some(target) = self.get(name) {
                    let kind = target.command.kind();
                    if target.depends_on.is_empty() {
                        plan.push_str(&format!("  {} [{}]\n", name, kind));
                    } else {
                        plan.push_str(&format!(
                            "  {} [{}] (after: {})\n",
                            name,
                            kind,
                            target.depends_on.join(", ")
                        ));
                    }
                }
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ValueCommand;
    use serde_json::Value;
    use std::sync::Arc;

    fn target(name: &str, deps: &[&str]) -> Target {
        deps.iter().fold(
            Target::new(name, Arc::new(ValueCommand::new(Value::Null))),
            |t, d| t.with_depends_on(*d),
        )
    }

    fn graph(edges: &[(&str, &[&str])]) -> TargetGraph {
        let mut graph = TargetGraph::new();
        for (name, deps) in edges {
            graph.add_target(target(name, deps)).unwrap();
        }
        graph
    }

    fn assert_respects_edges(graph: &TargetGraph, order: &[String]) {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        for t in graph.iter() {
            for dep in &t.depends_on {
                assert!(
                    position[dep.as_str()] < position[t.name.as_str()],
                    "{} placed before its dependency {}",
                    t.name,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_duplicate_name() {
        let mut graph = graph(&[("a", &[])]);
        let err = graph.add_target(target("a", &[])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateName("a".to_string()));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_self_cycle_rejected() {
        let mut graph = TargetGraph::new();
        let err = graph.add_target(target("a", &["a"])).unwrap_err();
        assert_eq!(
            err,
            GraphError::CycleDetected {
                cycle: vec!["a".to_string(), "a".to_string()]
            }
        );
        assert!(graph.is_empty());
    }

    #[test]
    fn test_forward_reference_cycle_rejected() {
        // a -> b declared before b exists; b -> a closes the loop
        let mut graph = graph(&[("a", &["b"])]);
        let err = graph.add_target(target("b", &["a"])).unwrap_err();

        match err {
            GraphError::CycleDetected { cycle } => assert_eq!(cycle, vec!["b", "a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(!graph.contains("b"));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_add_dependency_cycle_leaves_graph_unchanged() {
        let mut graph = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let before = graph.topological_order().unwrap();

        let err = graph.add_dependency("a", "c").unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
        assert!(graph.upstream("a").is_empty());
        assert_eq!(graph.topological_order().unwrap(), before);
    }

    #[test]
    fn test_add_dependency() {
        let mut graph = graph(&[("a", &[]), ("d", &[])]);
        graph.add_dependency("d", "a").unwrap();
        graph.add_dependency("d", "a").unwrap();

        assert_eq!(graph.upstream("d"), &["a".to_string()]);
        assert_eq!(
            graph.add_dependency("zzz", "a"),
            Err(GraphError::UnknownTarget("zzz".to_string()))
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let graph = graph(&[("a", &["ghost"])]);
        assert_eq!(
            graph.topological_order(),
            Err(GraphError::UnknownDependency {
                target: "a".to_string(),
                dependency: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_topological_order_ties_by_declaration() {
        let graph = graph(&[
            ("plot", &["fit_b", "fit_a"]),
            ("fit_b", &["recipe"]),
            ("data", &[]),
            ("recipe", &["data"]),
            ("fit_a", &["recipe"]),
            ("notes", &[]),
        ]);

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["data", "recipe", "fit_b", "fit_a", "plot", "notes"]);
        assert_respects_edges(&graph, &order);
    }

    #[test]
    fn test_order_respects_edges_on_wider_graph() {
        let graph = graph(&[
            ("e", &["c", "d"]),
            ("d", &["b"]),
            ("c", &["a", "b"]),
            ("b", &[]),
            ("a", &["b"]),
            ("f", &["e", "a"]),
        ]);

        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 6);
        assert_respects_edges(&graph, &order);
    }

    #[test]
    fn test_waves_and_plan() {
        let graph = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);

        let waves = graph.waves().unwrap();
        assert_eq!(waves, vec![vec!["a", "d"], vec!["b"], vec!["c"]]);

        let plan = graph.execution_plan().unwrap();
        assert!(plan.contains("Wave 0 (2 targets)"));
        assert!(plan.contains("c [value] (after: b)"));
    }

    #[test]
    fn test_descendants() {
        let graph = graph(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("d", &[]),
            ("e", &["a", "d"]),
        ]);

        let desc: Vec<_> = graph.descendants("a").into_iter().collect();
        assert_eq!(desc, vec!["b", "c", "e"]);
        assert!(graph.descendants("c").is_empty());
        assert_eq!(graph.dependents("d"), vec!["e"]);
    }

    #[test]
    fn test_duplicate_edges_collapsed() {
        let mut graph = TargetGraph::new();
        graph.add_target(target("a", &[])).unwrap();
        let mut b = target("b", &[]);
        b.depends_on = vec!["a".to_string(), "a".to_string()];
        graph.add_target(b).unwrap();

        assert_eq!(graph.upstream("b"), &["a".to_string()]);
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b"]);
    }
}
