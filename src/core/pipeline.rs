//! Pipeline graph: named steps, edges, entry and the end sentinel

use crate::core::{
    error::{BuildError, PipelineError},
    schema::StateSchema,
    state::State,
    step::Step,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Reserved terminal marker. Routing here ends the execution.
pub const END: &str = "__end__";

/// Routing function of a conditional edge
pub type RouteFn = Arc<dyn Fn(&State) -> String + Send + Sync>;

/// Outgoing edge of a step
#[derive(Clone)]
pub enum Edge {
    /// Fixed successor
    Direct(String),
    /// Successor chosen by a pure function of the state
    Conditional {
        route: RouteFn,
        candidates: Vec<String>,
    },
    /// Successor named by the step's own control directive
    Directive { targets: Vec<String> },
}

impl Edge {
    /// Every step this edge may lead to
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { candidates, .. } => candidates.iter().map(String::as_str).collect(),
            Edge::Directive { targets } => targets.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { candidates, .. } => f
                .debug_struct("Conditional")
                .field("candidates", candidates)
                .finish_non_exhaustive(),
            Edge::Directive { targets } => {
                f.debug_struct("Directive").field("targets", targets).finish()
            }
        }
    }
}

#[derive(Clone)]
pub(crate) struct Node {
    pub(crate) step: Arc<dyn Step>,
    pub(crate) edge: Edge,
}

/// Immutable, validated workflow graph.
///
/// A pipeline holds no execution state; one definition may serve any
/// number of concurrent executions.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    schema: StateSchema,
    nodes: HashMap<String, Node>,
    entry: String,
    /// Step names in topological order
    order: Vec<String>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>, schema: StateSchema) -> PipelineBuilder {
        PipelineBuilder::new(name, schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Step names in topological order, entry first
    pub fn step_names(&self) -> &[String] {
        &self.order
    }

    pub fn edge(&self, step: &str) -> Option<&Edge> {
        self.nodes.get(step).map(|n| &n.edge)
    }

    pub(crate) fn node(&self, step: &str) -> Option<&Node> {
        self.nodes.get(step)
    }

    /// Resolve the successor of `step` once its update has been merged.
    ///
    /// A directive wins over the edge but must still name one of the
    /// edge's candidates.
    pub fn resolve_next(
        &self,
        step: &str,
        state: &State,
        directive: Option<&str>,
    ) -> Result<String, PipelineError> {
        let edge = self.edge(step).ok_or_else(|| PipelineError::Routing {
            step: step.to_string(),
            selected: step.to_string(),
            candidates: self.order.clone(),
        })?;

        let selected = match (directive, edge) {
            (Some(target), _) => target.to_string(),
            (None, Edge::Direct(to)) => return Ok(to.clone()),
            (None, Edge::Conditional { route, .. }) => route(state),
            (None, Edge::Directive { .. }) => String::new(),
        };

        let candidates = edge.candidates();
        if candidates.contains(&selected.as_str()) {
            Ok(selected)
        } else {
            Err(PipelineError::Routing {
                step: step.to_string(),
                selected,
                candidates: candidates.into_iter().map(String::from).collect(),
            })
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("steps", &self.order)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Pipeline`]. Mistakes are collected and reported by [`build`](Self::build).
pub struct PipelineBuilder {
    name: String,
    schema: StateSchema,
    steps: Vec<(String, Arc<dyn Step>)>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
    errors: Vec<BuildError>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>, schema: StateSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            steps: Vec::new(),
            edges: HashMap::new(),
            entry: None,
            errors: Vec::new(),
        }
    }

    /// Register a step. The first registered step is the default entry.
    pub fn add_step(mut self, name: impl Into<String>, step: impl Step + 'static) -> Self {
        let name = name.into();
        if name == END {
            self.errors.push(BuildError::ReservedName(name));
        } else if self.steps.iter().any(|(n, _)| *n == name) {
            self.errors.push(BuildError::DuplicateStep(name));
        } else {
            self.steps.push((name, Arc::new(step)));
        }
        self
    }

    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.set_edge(from.into(), Edge::Direct(to.into()))
    }

    /// `route` must return one of `candidates`; anything else is a routing error at run time
    pub fn add_conditional_edge<F>(self, from: impl Into<String>, route: F, candidates: &[&str]) -> Self
    where
        F: Fn(&State) -> String + Send + Sync + 'static,
    {
        self.set_edge(
            from.into(),
            Edge::Conditional {
                route: Arc::new(route),
                candidates: candidates.iter().map(|c| c.to_string()).collect(),
            },
        )
    }

    /// Declare the targets a step may name in its control directive
    pub fn add_directive(self, from: impl Into<String>, targets: &[&str]) -> Self {
        self.set_edge(
            from.into(),
            Edge::Directive {
                targets: targets.iter().map(|t| t.to_string()).collect(),
            },
        )
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    fn set_edge(mut self, from: String, edge: Edge) -> Self {
        if self.edges.contains_key(&from) {
            self.errors.push(BuildError::DuplicateEdge(from));
        } else {
            self.edges.insert(from, edge);
        }
        self
    }

    /// Validate the graph and freeze it
    pub fn build(mut self) -> Result<Pipeline, BuildError> {
        if let Some(err) = self.errors.drain(..).next() {
            return Err(err);
        }

        let entry = self
            .entry
            .clone()
            .or_else(|| self.steps.first().map(|(n, _)| n.clone()))
            .ok_or_else(|| BuildError::MissingEntry(self.name.clone()))?;

        let known: HashSet<&str> = self.steps.iter().map(|(n, _)| n.as_str()).collect();
        if !known.contains(entry.as_str()) {
            return Err(BuildError::MissingEntry(self.name.clone()));
        }

        for (from, edge) in &self.edges {
            if !known.contains(from.as_str()) {
                return Err(BuildError::UnknownStep {
                    from: from.clone(),
                    to: from.clone(),
                });
            }
            let candidates = edge.candidates();
            if candidates.is_empty() {
                return Err(BuildError::EmptyCandidates(from.clone()));
            }
            for to in candidates {
                if to != END && !known.contains(to) {
                    return Err(BuildError::UnknownStep {
                        from: from.clone(),
                        to: to.to_string(),
                    });
                }
            }
        }

        let mut nodes = HashMap::new();
        for (name, step) in self.steps {
            let edge = self
                .edges
                .remove(&name)
                .ok_or_else(|| BuildError::NoSuccessor(name.clone()))?;
            nodes.insert(name, Node { step, edge });
        }

        let order = topological_order(&entry, &nodes)?;
        if order.len() < nodes.len() {
            debug!(
                "Pipeline '{}' has {} unreachable step(s)",
                self.name,
                nodes.len() - order.len()
            );
        }

        Ok(Pipeline {
            name: self.name,
            schema: self.schema,
            nodes,
            entry,
            order,
        })
    }
}

/// Depth-first cycle check over every possible edge, returning reachable
/// steps in topological order.
fn topological_order(entry: &str, nodes: &HashMap<String, Node>) -> Result<Vec<String>, BuildError> {
    let mut visited = HashSet::new();
    let mut recursion_stack = HashSet::new();
    let mut post_order = Vec::new();

    // Unreachable steps cannot run, but a cycle among them is still a construction bug
    let mut roots: Vec<&str> = vec![entry];
    let mut rest: Vec<&str> = nodes.keys().map(String::as_str).filter(|n| *n != entry).collect();
    rest.sort_unstable();
    roots.extend(rest);

    let mut reachable = HashSet::new();
    for (i, root) in roots.into_iter().enumerate() {
        if visited.contains(root) {
            continue;
        }
        let before = post_order.len();
        dfs_check(root, nodes, &mut visited, &mut recursion_stack, &mut post_order)?;
        if i == 0 {
            reachable.extend(post_order[before..].iter().cloned());
        }
    }

    post_order.retain(|n| reachable.contains(n));
    post_order.reverse();
    Ok(post_order)
}

fn dfs_check(
    step: &str,
    nodes: &HashMap<String, Node>,
    visited: &mut HashSet<String>,
    recursion_stack: &mut HashSet<String>,
    post_order: &mut Vec<String>,
) -> Result<(), BuildError> {
    visited.insert(step.to_string());
    recursion_stack.insert(step.to_string());

    if let Some(node) = nodes.get(step) {
        for next in node.edge.candidates() {
            if next == END {
                continue;
            }
            if recursion_stack.contains(next) {
                return Err(BuildError::Cycle(next.to_string()));
            }
            if !visited.contains(next) {
                dfs_check(next, nodes, visited, recursion_stack, post_order)?;
            }
        }
    }

    recursion_stack.remove(step);
    post_order.push(step.to_string());
    Ok(())
}
