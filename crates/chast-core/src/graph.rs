//! Dependency graph over run indices.
//!
//! Node `i` depends on every index listed in `dependencies[i]`. Execution order is the
//! level order of Kahn's algorithm: a group holds every node whose dependencies all live
//! in earlier groups.

use crate::errors::{ChastError, ChastResult};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Out-of-range and duplicate dependency indices are dropped.
    pub fn new(dependencies: Vec<Vec<usize>>) -> Self {
        let len = dependencies.len();
        let dependencies = dependencies
            .into_iter()
            .map(|mut deps| {
                deps.retain(|&d| d < len);
                deps.sort_unstable();
                deps.dedup();
                deps
            })
            .collect();
        Self { dependencies }
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn dependencies(&self, node: usize) -> &[usize] {
        self.dependencies.get(node).map_or(&[], Vec::as_slice)
    }

    /// Nodes that list `node` as a dependency, ascending.
    pub fn dependents(&self, node: usize) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.dependencies[i].contains(&node))
            .collect()
    }

    /// One cycle as a closed path (first node repeated at the end), if any.
    pub fn find_cycle(&self) -> Option<Vec<usize>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut stack: Vec<usize> = Vec::new();

        for start in 0..self.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            // Iterative DFS: (node, next dependency position)
            let mut frames = vec![(start, 0usize)];
            marks[start] = Mark::OnStack;
            stack.push(start);

            while let Some((node, pos)) = frames.last_mut() {
                let node = *node;
                if let Some(&dep) = self.dependencies[node].get(*pos) {
                    *pos += 1;
                    match marks[dep] {
                        Mark::OnStack => {
                            let from = stack.iter().position(|&n| n == dep).unwrap_or(0);
                            let mut cycle = stack[from..].to_vec();
                            cycle.push(dep);
                            return Some(cycle);
                        }
                        Mark::Unvisited => {
                            marks[dep] = Mark::OnStack;
                            stack.push(dep);
                            frames.push((dep, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    frames.pop();
                }
            }
        }
        None
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Groups of nodes that can run together, in dependency order. Nodes inside a group
    /// keep their declaration order.
    pub fn execution_order(&self) -> ChastResult<Vec<Vec<usize>>> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut scheduled = vec![false; self.len()];
        let mut groups = Vec::new();
        let mut placed = 0;

        while placed < self.len() {
            let group: Vec<usize> = (0..self.len())
                .filter(|&i| !scheduled[i] && remaining[i] == 0)
                .collect();
            if group.is_empty() {
                return Err(ChastError::IllegalArgument(
                    "dependency graph contains a cycle".into(),
                ));
            }
            for &node in &group {
                scheduled[node] = true;
                for dependent in self.dependents(node) {
                    remaining[dependent] -= 1;
                }
            }
            placed += group.len();
            groups.push(group);
        }
        Ok(groups)
    }
}
