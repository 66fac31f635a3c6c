//! Column dependency graph and generation planning

use crate::column::{ColumnFile, ColumnRegistry, ColumnSpec};
use crate::column_name::ColumnName;
use crate::error::{CoreError, CoreResult};
use crate::plan::{AvailableColumns, GenerationPlan, PlanOutcome};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A directed acyclic graph of column dependencies.
///
/// Nodes are indexed in insertion order. `parents[i]` holds the direct
/// dependencies of node `i`, `children[i]` its direct dependents.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    names: Vec<ColumnName>,
    index: HashMap<ColumnName, usize>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    base: HashSet<ColumnName>,
    registry: ColumnRegistry,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from a column file.
    ///
    /// `always_available` (case id and timestamp column) is added to the
    /// file's base columns. Every dependency must name a base or declared
    /// column, and the result must be acyclic.
    pub fn from_column_file(
        file: &ColumnFile,
        always_available: &[ColumnName],
    ) -> CoreResult<Self> {
        let mut graph = Self::new();

        for name in file.base_columns.iter().chain(always_available) {
            graph.base.insert(name.clone());
            graph.ensure_node(name);
        }
        for entry in &file.columns {
            if graph.base.contains(entry.name.as_str()) {
                return Err(CoreError::DuplicateColumn {
                    name: entry.name.to_string(),
                });
            }
            graph.registry.register(entry.to_spec())?;
            graph.ensure_node(&entry.name);
        }

        for entry in &file.columns {
            for dep in &entry.depends_on {
                if !graph.index.contains_key(dep.as_str()) {
                    return Err(CoreError::UnknownColumn {
                        name: dep.to_string(),
                    });
                }
                graph.add_edge(dep, &entry.name);
            }
        }

        graph.validate()?;
        log::debug!(
            "Built dependency graph: {} base columns, {} derivable columns",
            graph.base.len(),
            graph.registry.len()
        );

        Ok(graph)
    }

    /// Build a graph from `(column, dependencies)` pairs without validating it.
    ///
    /// Node indices follow first appearance, so iteration order fixes the
    /// tie-break order of every plan.
    pub fn from_edges<'a, I, D>(edges: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let mut graph = Self::new();
        for (column, deps) in edges {
            let column = Self::parse_name(column)?;
            graph.ensure_node(&column);
            for dep in deps {
                let dep = Self::parse_name(dep)?;
                graph.ensure_node(&dep);
                graph.add_edge(&dep, &column);
            }
        }
        Ok(graph)
    }

    /// Mark columns as base columns (always available).
    pub fn with_base_columns<'a, I>(mut self, names: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            let name = Self::parse_name(name)?;
            self.ensure_node(&name);
            self.base.insert(name);
        }
        Ok(self)
    }

    fn parse_name(name: &str) -> CoreResult<ColumnName> {
        ColumnName::try_new(name).ok_or_else(|| CoreError::EmptyName {
            context: "column name in dependency graph".into(),
        })
    }

    fn ensure_node(&mut self, name: &ColumnName) -> usize {
        if let Some(&idx) = self.index.get(name.as_str()) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.clone());
        self.index.insert(name.clone(), idx);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        idx
    }

    // Edge goes from the dependency to the dependent.
    fn add_edge(&mut self, dependency: &ColumnName, dependent: &ColumnName) {
        let from = self.index[dependency.as_str()];
        let to = self.index[dependent.as_str()];
        if !self.parents[to].contains(&from) {
            self.parents[to].push(from);
            self.children[from].push(to);
        }
    }

    /// Register a newly derivable column at runtime.
    ///
    /// Dependencies must already be known. The new column has no dependents,
    /// so it can never close a cycle.
    #[cfg(test)]
    pub(crate) fn add_column(&mut self, spec: ColumnSpec) -> CoreResult<()> {
        if self.index.contains_key(spec.name.as_str()) {
            return Err(CoreError::DuplicateColumn {
                name: spec.name.to_string(),
            });
        }
        if let Some(dep) = spec
            .depends_on
            .iter()
            .find(|d| !self.index.contains_key(d.as_str()))
        {
            return Err(CoreError::UnknownColumn {
                name: dep.to_string(),
            });
        }

        let name = spec.name.clone();
        let deps = spec.depends_on.clone();
        self.registry.register(spec)?;
        self.ensure_node(&name);
        for dep in &deps {
            self.add_edge(dep, &name);
        }
        Ok(())
    }

    /// Validate the graph has no cycles
    pub fn validate(&self) -> CoreResult<()> {
        let all: Vec<usize> = (0..self.names.len()).collect();
        self.sort_subset(&all).map(|_| ())
    }

    /// Compute the columns to generate so that `requested` becomes available.
    pub fn plan(
        &self,
        requested: &[ColumnName],
        available: &AvailableColumns,
    ) -> CoreResult<PlanOutcome> {
        let is_available =
            |name: &str| available.contains(name) || self.base.contains(name);

        if requested.iter().all(|c| is_available(c.as_str())) {
            return Ok(PlanOutcome::NotNeeded);
        }

        // Reverse BFS; available ancestors are kept as boundary nodes.
        let mut in_subgraph = vec![false; self.names.len()];
        let mut queue = VecDeque::new();
        for column in requested {
            if is_available(column.as_str()) {
                continue;
            }
            let idx = self
                .index
                .get(column.as_str())
                .copied()
                .ok_or_else(|| CoreError::UnknownColumn {
                    name: column.to_string(),
                })?;
            if !in_subgraph[idx] {
                in_subgraph[idx] = true;
                queue.push_back(idx);
            }
        }
        while let Some(idx) = queue.pop_front() {
            for &parent in &self.parents[idx] {
                if in_subgraph[parent] {
                    continue;
                }
                in_subgraph[parent] = true;
                if !is_available(self.names[parent].as_str()) {
                    queue.push_back(parent);
                }
            }
        }

        let members: Vec<usize> = (0..self.names.len()).filter(|&i| in_subgraph[i]).collect();
        let order = self.sort_subset(&members)?;

        let mut placed = vec![false; self.names.len()];
        let mut plan = GenerationPlan::default();
        for idx in order {
            let name = &self.names[idx];
            if is_available(name.as_str()) {
                continue;
            }
            let satisfiable = self.parents[idx]
                .iter()
                .all(|&p| placed[p] || is_available(self.names[p].as_str()));
            if satisfiable {
                placed[idx] = true;
                plan.columns.push(name.clone());
            } else {
                log::warn!(
                    "Not all dependencies are available for column '{}', skipping",
                    name
                );
                plan.skipped.push(name.clone());
            }
        }

        log::debug!(
            "Planned {} column(s) for request [{}]",
            plan.columns.len(),
            requested
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(PlanOutcome::Plan(plan))
    }

    /// Kahn's algorithm over the induced sub-graph of `members`.
    ///
    /// The ready set is ordered by node index, so the result is deterministic.
    fn sort_subset(&self, members: &[usize]) -> CoreResult<Vec<usize>> {
        let mut is_member = vec![false; self.names.len()];
        for &m in members {
            is_member[m] = true;
        }

        let mut indegree = vec![0usize; self.names.len()];
        for &m in members {
            indegree[m] = self.parents[m].iter().filter(|&&p| is_member[p]).count();
        }

        let mut ready: BTreeSet<usize> =
            members.iter().copied().filter(|&m| indegree[m] == 0).collect();
        let mut order = Vec::with_capacity(members.len());

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for &child in &self.children[idx] {
                if !is_member[child] {
                    continue;
                }
                indegree[child] -= 1;
                if indegree[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() < members.len() {
            let stuck: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&m| indegree[m] > 0)
                .collect();
            return Err(CoreError::CircularDependency {
                cycle: self.find_cycle_path(&stuck),
            });
        }

        Ok(order)
    }

    /// Render one cycle among `stuck` nodes as `a -> b -> a`.
    ///
    /// Every stuck node has a stuck parent, so walking parents from the
    /// lowest index always closes a loop.
    fn find_cycle_path(&self, stuck: &[usize]) -> String {
        let is_stuck: HashSet<usize> = stuck.iter().copied().collect();
        let Some(&start) = stuck.iter().min() else {
            return String::new();
        };

        let mut walk = vec![start];
        let mut seen_at: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut current = start;
        loop {
            let next = self.parents[current]
                .iter()
                .copied()
                .filter(|p| is_stuck.contains(p))
                .min();
            let Some(next) = next else {
                break;
            };
            if let Some(&pos) = seen_at.get(&next) {
                // Parents were followed backwards; reverse to read along edges.
                let mut cycle = vec![self.names[next].as_str()];
                cycle.extend(walk[pos + 1..].iter().rev().map(|&i| self.names[i].as_str()));
                cycle.push(self.names[next].as_str());
                return cycle.join(" -> ");
            }
            seen_at.insert(next, walk.len());
            walk.push(next);
            current = next;
        }

        walk.iter()
            .map(|&i| self.names[i].as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Generation instructions for a plan, in plan order.
    pub fn instructions_for(&self, plan: &GenerationPlan) -> CoreResult<Vec<&str>> {
        plan.columns
            .iter()
            .map(|c| self.registry.instruction(c))
            .collect()
    }

    /// Human-readable definitions for a plan, in plan order.
    pub fn definitions_for(&self, plan: &GenerationPlan) -> CoreResult<Vec<&str>> {
        plan.columns
            .iter()
            .map(|c| self.registry.definition(c))
            .collect()
    }

    /// All columns in topological order (dependencies first)
    pub fn topological_order(&self) -> CoreResult<Vec<ColumnName>> {
        let all: Vec<usize> = (0..self.names.len()).collect();
        Ok(self
            .sort_subset(&all)?
            .into_iter()
            .map(|i| self.names[i].clone())
            .collect())
    }

    /// Direct dependencies of a column
    pub fn dependencies(&self, column: &str) -> Vec<&ColumnName> {
        self.neighbours(column, &self.parents)
    }

    /// Direct dependents of a column
    pub fn dependents(&self, column: &str) -> Vec<&ColumnName> {
        self.neighbours(column, &self.children)
    }

    fn neighbours<'a>(&'a self, column: &str, adjacency: &'a [Vec<usize>]) -> Vec<&'a ColumnName> {
        match self.index.get(column) {
            Some(&idx) => adjacency[idx].iter().map(|&i| &self.names[i]).collect(),
            None => Vec::new(),
        }
    }

    /// All transitive dependencies of a column, nearest first
    pub fn ancestors(&self, column: &str) -> Vec<&ColumnName> {
        let Some(&start) = self.index.get(column) else {
            return Vec::new();
        };
        let mut visited = vec![false; self.names.len()];
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut result = Vec::new();
        while let Some(idx) = queue.pop_front() {
            for &parent in &self.parents[idx] {
                if !visited[parent] {
                    visited[parent] = true;
                    result.push(&self.names[parent]);
                    queue.push_back(parent);
                }
            }
        }
        result
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    pub fn is_base(&self, column: &str) -> bool {
        self.base.contains(column)
    }

    /// All columns in insertion order
    pub fn columns(&self) -> &[ColumnName] {
        &self.names
    }

    /// Base columns in insertion order
    pub fn base_columns(&self) -> Vec<&ColumnName> {
        self.names
            .iter()
            .filter(|n| self.base.contains(n.as_str()))
            .collect()
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn spec(&self, column: &str) -> Option<&ColumnSpec> {
        self.registry.get(column)
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
