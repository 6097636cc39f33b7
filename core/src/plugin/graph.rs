use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::PluginError;

/// Required-dependency edges of every registered plugin.
///
/// Nodes are registered plugin names; `edges[a] = [b, c]` means `a` requires `b` and `c`,
/// in declaration order. Optional dependencies are not edges.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the node `name`.
    pub fn insert(&mut self, name: &str, required: Vec<String>) {
        self.edges.insert(name.to_string(), required);
    }

    /// Drop the node; edges that point at it stay and show up as missing.
    pub fn remove(&mut self, name: &str) -> bool {
        self.edges.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    /// Required dependencies of `name`, in declaration order.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `name` must be registered and every one of its required dependencies too.
    pub fn validate_dependencies(&self, name: &str) -> Result<(), PluginError> {
        let Some(deps) = self.edges.get(name) else {
            return Err(PluginError::dependency(name, format!("plugin '{name}' is not registered")));
        };
        for dep in deps {
            if !self.edges.contains_key(dep) {
                return Err(PluginError::dependency(
                    name,
                    format!("required dependency '{dep}' of '{name}' is not registered"),
                )
                .with_context("missing_dependency", dep.as_str()));
            }
        }
        Ok(())
    }

    /// Depth-first walk from `name`; fails on the first back-edge with the ordered loop,
    /// e.g. `["a", "b", "c", "a"]`. Diamonds are not cycles.
    pub fn detect_cycles(&self, name: &str) -> Result<(), PluginError> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        if self.dfs_cycle(name, &mut visited, &mut stack) {
            let cycle: Vec<Value> = stack.iter().map(|s| Value::String(s.clone())).collect();
            return Err(PluginError::dependency(
                name,
                format!("circular dependency detected: {}", format_cycle_path(&stack)),
            )
            .with_context("dependency_cycle", cycle));
        }
        Ok(())
    }

    fn dfs_cycle(&self, node: &str, visited: &mut HashSet<String>, stack: &mut Vec<String>) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dep in dependencies {
                // Back-edge: dep is on the current path.
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }

    /// Everything `run(name)` needs before any plugin body executes: every reachable
    /// plugin is registered with its required dependencies, and there is no cycle.
    pub fn preflight(&self, name: &str) -> Result<(), PluginError> {
        self.validate_dependencies(name)?;
        self.detect_cycles(name)?;

        let mut seen = HashSet::new();
        let mut pending = vec![name.to_string()];
        while let Some(node) = pending.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            self.validate_dependencies(&node)
                .map_err(|e| e.with_context("requested_by", name))?;
            pending.extend(self.dependencies_of(&node).iter().cloned());
        }
        Ok(())
    }

    /// Order in which `run(name)` executes required plugin bodies: depth-first,
    /// left to right, `name` last. A dependency shared by two branches appears once
    /// per branch, matching how often it actually runs.
    pub fn resolution_order(&self, name: &str) -> Result<Vec<String>, PluginError> {
        self.preflight(name)?;
        let mut order = Vec::new();
        self.collect_order(name, &mut order);
        Ok(order)
    }

    fn collect_order(&self, node: &str, order: &mut Vec<String>) {
        for dep in self.dependencies_of(node) {
            self.collect_order(dep, order);
        }
        order.push(node.to_string());
    }
}

fn format_cycle_path(stack: &[String]) -> String {
    stack.join(" -> ")
}
