//! Stage DAG (Directed Acyclic Graph) for dependency-mode projects.
//!
//! This module provides the StageGraph structure that stores stages in an
//! arena graph and answers the scheduling questions: which stages are ready,
//! which became ready because of a transition, and which are stuck behind a
//! failure.

use crate::core::ident::validate_id;
use crate::core::keyed;
use crate::core::stage::{Stage, StageStatus, StatusChange};
use crate::error::{Error, Result};
use petgraph::algo::{astar, has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Output of a finished dependency, forwarded to the next assignee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyOutput {
    pub stage: String,
    pub agent: String,
    pub output: String,
}

/// A stage that can be dispatched right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyStage {
    pub stage: String,
    pub agent: String,
    pub description: String,
    pub depends_on: Vec<String>,
    /// Non-empty dependency outputs, in declared dependency order.
    pub dependency_outputs: Vec<DependencyOutput>,
    /// All dependency outputs concatenated for a dispatch prompt.
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// Result of a status change in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DagTransition {
    #[serde(flatten)]
    pub change: StatusChange,
    /// Stages that entered the ready-set because of this change.
    pub newly_unblocked: Vec<String>,
    /// Full ready-set after the change.
    pub ready: Vec<String>,
}

/// One row of the read-only tree view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeLine {
    pub indent: String,
    pub last: bool,
    pub stage: String,
    pub agent: String,
    pub status: StageStatus,
    /// The stage was already printed under another parent.
    pub repeated: bool,
}

/// The stage dependency graph.
///
/// Nodes are stages and an edge `a -> b` means `b` depends on `a`. Nodes are
/// never removed, so node indices follow insertion order and every scan
/// reports stages in the order they were added.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphRecord", into = "GraphRecord")]
pub struct StageGraph {
    graph: DiGraph<Stage, ()>,
    stage_index: HashMap<String, NodeIndex>,
}

/// Serialized form: the `stages` map of the project record.
#[derive(Serialize, Deserialize)]
struct GraphRecord {
    #[serde(with = "keyed", default)]
    stages: Vec<Stage>,
}

impl StageGraph {
    /// Create a new empty StageGraph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            stage_index: HashMap::new(),
        }
    }

    /// Rebuild a graph from persisted stages.
    ///
    /// Dependencies may point at stages stored later in the list (edges added
    /// with [`StageGraph::add_dependencies`] can do that), so all nodes are
    /// inserted before any edge. Unknown dependencies and cycles are rejected.
    pub fn from_stages(stages: Vec<Stage>) -> Result<Self> {
        let mut dag = Self::new();
        for stage in stages {
            validate_id("stage", &stage.id)?;
            if dag.stage_index.contains_key(&stage.id) {
                return Err(Error::StageExists(stage.id));
            }
            let id = stage.id.clone();
            let index = dag.graph.add_node(stage);
            dag.stage_index.insert(id, index);
        }

        let edges: Vec<(NodeIndex, String, String)> = dag
            .graph
            .node_indices()
            .flat_map(|index| {
                let stage = &dag.graph[index];
                stage
                    .depends_on
                    .iter()
                    .map(move |dep| (index, stage.id.clone(), dep.clone()))
            })
            .collect();
        for (to, stage, dep) in edges {
            let from = *dag
                .stage_index
                .get(&dep)
                .ok_or(Error::UnknownDependency {
                    stage,
                    dependency: dep,
                })?;
            dag.graph.update_edge(from, to, ());
        }

        if is_cyclic_directed(&dag.graph) {
            return Err(Error::Validation(
                "stored dependency graph contains a cycle".to_string(),
            ));
        }
        Ok(dag)
    }

    /// Add a stage together with its dependencies.
    ///
    /// Every dependency must already exist; forward references are rejected
    /// with `UnknownDependency`. A stage that did not exist before has no
    /// incoming paths, so it cannot close a cycle. Nothing is modified when
    /// an error is returned.
    pub fn add_stage(&mut self, mut stage: Stage) -> Result<()> {
        validate_id("stage", &stage.id)?;
        if self.stage_index.contains_key(&stage.id) {
            return Err(Error::StageExists(stage.id));
        }

        let mut deps: Vec<String> = Vec::with_capacity(stage.depends_on.len());
        for dep in &stage.depends_on {
            if !self.stage_index.contains_key(dep) {
                return Err(Error::UnknownDependency {
                    stage: stage.id.clone(),
                    dependency: dep.clone(),
                });
            }
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        stage.depends_on = deps;

        let id = stage.id.clone();
        let dep_indices: Vec<NodeIndex> = stage
            .depends_on
            .iter()
            .filter_map(|dep| self.stage_index.get(dep).copied())
            .collect();
        let index = self.graph.add_node(stage);
        self.stage_index.insert(id, index);
        for dep_index in dep_indices {
            self.graph.add_edge(dep_index, index, ());
        }
        Ok(())
    }

    /// Make an existing stage depend on more stages.
    ///
    /// Each new dependency is checked for reachability first: if the stage
    /// can already reach the dependency, the new edge would close a cycle and
    /// `CycleDetected` is returned with the offending path. Either all edges
    /// are added or none are. Returns the dependencies that were new.
    pub fn add_dependencies(&mut self, id: &str, deps: &[String]) -> Result<Vec<String>> {
        let index = self.node(id)?;

        let mut added: Vec<(String, NodeIndex)> = Vec::new();
        for dep in deps {
            let dep_index =
                self.stage_index
                    .get(dep)
                    .copied()
                    .ok_or_else(|| Error::UnknownDependency {
                        stage: id.to_string(),
                        dependency: dep.clone(),
                    })?;
            if self.graph[index].depends_on.contains(dep)
                || added.iter().any(|(existing, _)| existing == dep)
            {
                continue;
            }
            if let Some(path) = self.cycle_through(index, dep_index) {
                return Err(Error::CycleDetected { path });
            }
            added.push((dep.clone(), dep_index));
        }

        for (dep, dep_index) in &added {
            self.graph.add_edge(*dep_index, index, ());
            self.graph[index].depends_on.push(dep.clone());
        }
        Ok(added.into_iter().map(|(dep, _)| dep).collect())
    }

    /// If adding `dep -> stage` closes a cycle, return it in depends-on order
    /// (`stage -> dep -> ... -> stage`).
    fn cycle_through(&self, stage: NodeIndex, dep: NodeIndex) -> Option<Vec<String>> {
        if stage == dep {
            let id = self.graph[stage].id.clone();
            return Some(vec![id.clone(), id]);
        }
        if !has_path_connecting(&self.graph, stage, dep, None) {
            return None;
        }
        let (_, path) = astar(&self.graph, stage, |n| n == dep, |_| 1, |_| 0)?;
        let mut cycle = vec![self.graph[stage].id.clone()];
        cycle.extend(path.iter().rev().map(|&n| self.graph[n].id.clone()));
        Some(cycle)
    }

    fn node(&self, id: &str) -> Result<NodeIndex> {
        self.stage_index
            .get(id)
            .copied()
            .ok_or_else(|| Error::StageNotFound(id.to_string()))
    }

    /// Get a reference to a stage by its ID.
    pub fn get(&self, id: &str) -> Option<&Stage> {
        self.stage_index.get(id).map(|&index| &self.graph[index])
    }

    /// Get a mutable reference to a stage.
    ///
    /// Callers must not edit `depends_on`; use `add_dependencies`.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Stage> {
        let index = *self.stage_index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    /// All stages in insertion order.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.graph.node_weights()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stage_index.contains_key(id)
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Stages that list `id` as a dependency, in insertion order.
    pub fn dependents(&self, id: &str) -> Vec<&Stage> {
        let Some(&index) = self.stage_index.get(id) else {
            return Vec::new();
        };
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        children.sort();
        children.into_iter().map(|n| &self.graph[n]).collect()
    }

    // ========== Scheduling Operations ==========

    /// Pending, every direct dependency done, and no failed stage upstream.
    ///
    /// A dependency can move from `done` to `failed`, so checking direct
    /// dependencies alone is not enough.
    fn is_ready(&self, index: NodeIndex, behind_failure: &HashSet<NodeIndex>) -> bool {
        let stage = &self.graph[index];
        stage.status == StageStatus::Pending
            && !behind_failure.contains(&index)
            && self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .all(|dep| self.graph[dep].status == StageStatus::Done)
    }

    fn ready_indices(&self) -> Vec<NodeIndex> {
        let behind_failure = self.failure_descendants();
        self.graph
            .node_indices()
            .filter(|&index| self.is_ready(index, &behind_failure))
            .collect()
    }

    /// IDs of every ready stage, in insertion order.
    ///
    /// A full scan on every call; graphs here have tens of nodes.
    pub fn ready_ids(&self) -> Vec<String> {
        self.ready_indices()
            .into_iter()
            .map(|index| self.graph[index].id.clone())
            .collect()
    }

    /// Every ready stage with its dependencies' outputs attached.
    pub fn ready(&self) -> Vec<ReadyStage> {
        self.ready_indices()
            .into_iter()
            .map(|index| self.ready_stage(&self.graph[index]))
            .collect()
    }

    fn ready_stage(&self, stage: &Stage) -> ReadyStage {
        let dependency_outputs: Vec<DependencyOutput> = stage
            .depends_on
            .iter()
            .filter_map(|dep| self.get(dep))
            .filter_map(|dep| {
                dep.output().map(|output| DependencyOutput {
                    stage: dep.id.clone(),
                    agent: dep.agent.clone(),
                    output: output.to_string(),
                })
            })
            .collect();
        let context = dependency_outputs
            .iter()
            .map(|d| format!("### {} ({})\n{}", d.stage, d.agent, d.output))
            .collect::<Vec<_>>()
            .join("\n\n");

        ReadyStage {
            stage: stage.id.clone(),
            agent: stage.agent.clone(),
            description: stage.description.clone(),
            depends_on: stage.depends_on.clone(),
            dependency_outputs,
            context,
            workspace: None,
        }
    }

    /// Change a stage's status and report what it unblocked.
    pub fn update_status(&mut self, id: &str, status: StageStatus) -> Result<DagTransition> {
        let index = self.node(id)?;
        let before = self.ready_ids();
        let change = self.graph[index].set_status(status)?;
        Ok(self.transition(change, before))
    }

    /// Return one stage to `pending`. Dependents are left untouched.
    pub fn reset_stage(&mut self, id: &str) -> Result<DagTransition> {
        let index = self.node(id)?;
        let before = self.ready_ids();
        let change = self.graph[index].reset();
        Ok(self.transition(change, before))
    }

    fn transition(&self, change: StatusChange, before: Vec<String>) -> DagTransition {
        let ready = self.ready_ids();
        let newly_unblocked = ready
            .iter()
            .filter(|id| !before.contains(id))
            .cloned()
            .collect();
        DagTransition {
            change,
            newly_unblocked,
            ready,
        }
    }

    /// Not-done stages that have a failed stage among their transitive
    /// dependencies. None of them can become ready until the failure is reset.
    pub fn blocked_by_failure(&self) -> Vec<String> {
        let blocked = self.failure_descendants();
        self.graph
            .node_indices()
            .filter(|index| blocked.contains(index))
            .filter(|&index| self.graph[index].status != StageStatus::Done)
            .map(|index| self.graph[index].id.clone())
            .collect()
    }

    /// Every stage downstream of a failed stage.
    fn failure_descendants(&self) -> HashSet<NodeIndex> {
        let mut reached: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&index| self.graph[index].status == StageStatus::Failed)
            .collect();

        while let Some(index) = queue.pop_front() {
            for child in self.graph.neighbors_directed(index, Direction::Outgoing) {
                if reached.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        reached
    }

    pub fn count_with_status(&self, status: StageStatus) -> usize {
        self.stages().filter(|s| s.status == status).count()
    }

    /// Check if every stage is done. False for an empty graph.
    pub fn all_done(&self) -> bool {
        !self.is_empty() && self.stages().all(|s| s.status == StageStatus::Done)
    }

    /// Depth-first tree from the roots, children in insertion order.
    pub fn tree(&self) -> Vec<TreeLine> {
        let roots: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&index| self.graph[index].depends_on.is_empty())
            .collect();

        let mut lines = Vec::with_capacity(self.len());
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let count = roots.len();
        for (i, root) in roots.into_iter().enumerate() {
            self.tree_walk(root, String::new(), i + 1 == count, &mut visited, &mut lines);
        }
        lines
    }

    fn tree_walk(
        &self,
        index: NodeIndex,
        indent: String,
        last: bool,
        visited: &mut HashSet<NodeIndex>,
        lines: &mut Vec<TreeLine>,
    ) {
        let stage = &self.graph[index];
        let repeated = !visited.insert(index);
        lines.push(TreeLine {
            indent: indent.clone(),
            last,
            stage: stage.id.clone(),
            agent: stage.agent.clone(),
            status: stage.status,
            repeated,
        });
        if repeated {
            return;
        }

        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        children.sort();
        let child_indent = format!("{}{}", indent, if last { "   " } else { "│  " });
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.tree_walk(child, child_indent.clone(), i + 1 == count, visited, lines);
        }
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGraph")
            .field("stages", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

impl From<StageGraph> for GraphRecord {
    fn from(dag: StageGraph) -> Self {
        let (nodes, _) = dag.graph.into_nodes_edges();
        Self {
            stages: nodes.into_iter().map(|node| node.weight).collect(),
        }
    }
}

impl TryFrom<GraphRecord> for StageGraph {
    type Error = Error;

    fn try_from(record: GraphRecord) -> Result<Self> {
        Self::from_stages(record.stages)
    }
}
