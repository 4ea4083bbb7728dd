use std::collections::{HashMap, HashSet};

use crate::error::WorkflowError;
use crate::executor::types::TaskLike;

/// Step dependency graph (DAG)
#[derive(Debug, Clone)]
pub struct TaskGraph<T: TaskLike> {
    /// Step nodes: step_id -> step
    pub nodes: HashMap<String, T>,

    /// Dependency edges: step_id -> list of dependencies
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: step_id -> list of steps that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<String>,
}

impl<T: TaskLike> TaskGraph<T> {
    /// Construct the graph from a step list
    pub fn from_tasks(tasks: &[T]) -> Result<Self, WorkflowError> {
        let mut nodes = HashMap::new();
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut insertion_order = Vec::new();

        for task in tasks {
            if nodes.contains_key(task.id()) {
                return Err(WorkflowError::DuplicateStepId(task.id().to_string()));
            }

            let task_id = task.id().to_string();
            let dependencies = task.dependencies().to_vec();

            nodes.insert(task_id.clone(), task.clone());
            edges.insert(task_id.clone(), dependencies.clone());
            insertion_order.push(task_id.clone());

            for dep in dependencies {
                reverse_edges.entry(dep).or_default().push(task_id.clone());
            }
        }

        Ok(Self {
            nodes,
            edges,
            reverse_edges,
            insertion_order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids in declaration order.
    pub fn ids(&self) -> &[String] {
        &self.insertion_order
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Validate dependency relationships
    pub fn validate(&self) -> Result<(), WorkflowError> {
        for task_id in &self.insertion_order {
            for dep in self.dependencies_of(task_id) {
                if !self.nodes.contains_key(dep) {
                    return Err(WorkflowError::DependencyNotFound {
                        step_id: task_id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        if let Some((offender, path)) = self.detect_cycle() {
            return Err(WorkflowError::CircularDependency {
                offender,
                path: format_cycle_path(&path),
            });
        }

        Ok(())
    }

    /// Topological sort using Kahn's algorithm
    ///
    /// Returns execution stages where steps in the same stage can run in parallel.
    ///
    /// # Algorithm
    ///
    /// 1. Calculate in-degree for all nodes
    /// 2. Find all nodes with in-degree 0 (first stage)
    /// 3. Remove these nodes and update in-degrees
    /// 4. Repeat until all nodes processed
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of steps, E = number of dependencies
    pub fn topological_sort(&self) -> Result<Vec<Vec<String>>, WorkflowError> {
        // edges[A] = [B, C] means A depends on B and C, so A's in-degree is 2.
        let mut in_degree: HashMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut stages: Vec<Vec<String>> = Vec::new();
        let mut current_stage: Vec<String> = self
            .insertion_order
            .iter()
            .filter(|id| in_degree.get(id.as_str()).copied() == Some(0))
            .cloned()
            .collect();

        let mut processed = 0;

        while !current_stage.is_empty() {
            processed += current_stage.len();

            let mut next_stage = Vec::new();
            for task_id in &current_stage {
                if let Some(dependents) = self.reverse_edges.get(task_id) {
                    for dependent in dependents {
                        if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                            *degree = degree.saturating_sub(1);
                            if *degree == 0 {
                                next_stage.push(dependent.clone());
                            }
                        }
                    }
                }
            }

            // Preserve input order
            next_stage.sort_by_key(|id| self.position(id));
            next_stage.dedup();

            stages.push(std::mem::replace(&mut current_stage, next_stage));
        }

        if processed != self.nodes.len() {
            let (offender, path) = self
                .detect_cycle()
                .unwrap_or_else(|| ("<unknown>".to_string(), Vec::new()));
            return Err(WorkflowError::CircularDependency {
                offender,
                path: format_cycle_path(&path),
            });
        }

        Ok(stages)
    }

    /// Flattened topological order, stable with respect to declaration order.
    pub fn execution_order(&self) -> Result<Vec<String>, WorkflowError> {
        Ok(self.topological_sort()?.into_iter().flatten().collect())
    }

    /// Every step `id` transitively depends on, in declaration order.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = self.dependencies_of(id).iter().map(String::as_str).collect();
        while let Some(node) = stack.pop() {
            if seen.insert(node.to_string()) {
                stack.extend(self.dependencies_of(node).iter().map(String::as_str));
            }
        }
        self.insertion_order
            .iter()
            .filter(|id| seen.contains(*id))
            .cloned()
            .collect()
    }

    fn position(&self, id: &str) -> usize {
        self.insertion_order
            .iter()
            .position(|k| k == id)
            .unwrap_or(usize::MAX)
    }

    /// Detect circular dependencies using DFS with a recursion stack.
    ///
    /// Roots are visited in declaration order and dependencies in the order
    /// they were declared, so the reported offender (the first id re-entered
    /// while still on the stack) is deterministic.
    fn detect_cycle(&self) -> Option<(String, Vec<String>)> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) {
                if let Some(found) = self.dfs_cycle(task_id, &mut visited, &mut stack) {
                    return Some(found);
                }
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Option<(String, Vec<String>)> {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        for dep in self.dependencies_of(node) {
            if let Some(pos) = stack.iter().position(|x| x == dep) {
                let mut path = stack[pos..].to_vec();
                path.push(dep.clone());
                return Some((dep.clone(), path));
            }

            if !visited.contains(dep) && self.nodes.contains_key(dep) {
                if let Some(found) = self.dfs_cycle(dep, visited, stack) {
                    return Some(found);
                }
            }
        }

        stack.pop();
        None
    }
}

/// Split dependency stages into levels holding at most `cap` steps each.
/// Chunks of one stage run back to back, which keeps every level ordered
/// after all of its dependencies.
pub fn cap_levels(stages: Vec<Vec<String>>, cap: usize) -> Vec<Vec<String>> {
    let cap = cap.max(1);
    stages
        .into_iter()
        .flat_map(|stage| {
            stage
                .chunks(cap)
                .map(<[String]>::to_vec)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn format_cycle_path(stack: &[String]) -> String {
    stack.join(" -> ")
}
