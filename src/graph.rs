//! The render step graph implied by a render operator and its inputs.
//!
//! The host render planner is run in dry-run, dependency-annotated,
//! frame-listing mode. Every non-blank line of its output is one step:
//!
//! ```text
//! <id> [ <dep-id>* ] <node-path> \t( <start> <stop> <step> )
//! ```
//!
//! Ids are tokens assigned by the planner for one run only. Steps are kept
//! in planner order, which is also a valid execution order, and wired into
//! a [`petgraph`] graph with edges running from a dependency to its
//! dependent.

use std::collections::{HashMap, HashSet};

use petgraph::Graph;
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;

use crate::error::ExtractError;
use crate::frames::FrameRange;
use crate::host::Host;

/// One schedulable unit of work derived from a render operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderStep {
    /// Planner-assigned id, unique within one extraction.
    pub id: String,
    /// `"<path>-<id>"`, unique even when operators share a type.
    pub name: String,
    /// Path of the render operator.
    pub rop: String,
    /// Ids of the steps this one waits for.
    pub deps: Vec<String>,
    pub frames: FrameRange,
}

/// A raw planner line, before graph resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlanLine {
    pub id: String,
    pub deps: Vec<String>,
    pub path: String,
    pub frames: FrameRange,
}

/// Parses a single non-blank planner line. `line` is the 1-based line number
/// used in error messages.
pub(crate) fn parse_line(line: usize, text: &str) -> Result<PlanLine, ExtractError> {
    let malformed = |reason| ExtractError::MalformedLine {
        line,
        reason,
        text: text.to_string(),
    };

    let (ops, frames) = text
        .split_once('\t')
        .ok_or_else(|| malformed("missing frame range column"))?;

    // The host ends the operator column with a separator, which leaves an
    // empty trailing token when split literally.
    let tokens = ops.split_whitespace().collect::<Vec<_>>();
    let [id, between @ .., path] = &tokens[..] else {
        return Err(malformed("expected an id and a node path"));
    };

    let deps = between
        .iter()
        .filter(|token| !matches!(**token, "[" | "]"))
        .map(|token| token.to_string())
        .collect();

    Ok(PlanLine {
        id: id.to_string(),
        deps,
        path: path.to_string(),
        frames: FrameRange::parse_planner(frames)?,
    })
}

/// Parses the full planner output into lines, skipping blank ones.
pub(crate) fn parse_plan(text: &str) -> Result<Vec<PlanLine>, ExtractError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_line(i + 1, line))
        .collect()
}

/// Ordered render steps forming a DAG keyed by step id.
#[derive(Debug, Default)]
pub struct StepGraph {
    graph: Graph<RenderStep, ()>,
    index: HashMap<String, NodeIndex>,
}

impl StepGraph {
    /// Runs the host planner for `rop` and builds the graph of every step it
    /// lists, minus the submitting operators themselves.
    ///
    /// `submitter_types` are the operator type names that submit to the farm;
    /// steps of those types, and the step of `rop` itself, are never
    /// scheduled.
    pub fn extract<H>(host: &H, rop: &str, submitter_types: &[String]) -> Result<Self, ExtractError>
    where
        H: Host + ?Sized,
    {
        let plan = host.render_plan(rop);
        if !plan.stderr.trim().is_empty() {
            return Err(ExtractError::Host(plan.stderr));
        }

        let lines = parse_plan(&plan.stdout)?;
        let mut kept = Vec::with_capacity(lines.len());
        let mut skipped = HashSet::new();

        for line in lines {
            let node_type = host
                .node_type(&line.path)
                .ok_or_else(|| ExtractError::UnknownNode(line.path.clone()))?;

            if line.path == rop || submitter_types.iter().any(|t| *t == node_type.name) {
                tracing::debug!(rop = %line.path, id = %line.id, "skipping submitter step");
                skipped.insert(line.id);
                continue;
            }

            kept.push(line);
        }

        let graph = Self::from_lines(kept, &skipped)?;
        tracing::debug!(rop, steps = graph.len(), "extracted render steps");

        Ok(graph)
    }

    /// Builds the graph from parsed lines. Dependencies on `skipped` ids are
    /// dropped; dependencies on ids that were never listed are an error.
    pub(crate) fn from_lines(
        lines: Vec<PlanLine>,
        skipped: &HashSet<String>,
    ) -> Result<Self, ExtractError> {
        let mut graph = Graph::new();
        let mut index = HashMap::new();

        for line in lines {
            if index.contains_key(&line.id) {
                return Err(ExtractError::DuplicateStep(line.id));
            }

            let step = RenderStep {
                name: format!("{}-{}", line.path, line.id),
                id: line.id.clone(),
                rop: line.path,
                deps: line.deps,
                frames: line.frames,
            };

            index.insert(line.id, graph.add_node(step));
        }

        // Dependencies may point at steps listed later, so edges are wired
        // only once every id is known.
        let mut edges = Vec::new();
        for node in graph.node_indices() {
            let step = &graph[node];
            for dep in &step.deps {
                match index.get(dep) {
                    Some(&from) => edges.push((from, node)),
                    None if skipped.contains(dep) => {
                        tracing::debug!(step = %step.name, dep = %dep, "dropping dependency on skipped step");
                    }
                    None => {
                        return Err(ExtractError::UnknownDependency {
                            step: step.name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to, ());
        }

        for node in graph.node_indices() {
            graph[node].deps.retain(|dep| index.contains_key(dep));
        }

        toposort(&graph, None)
            .map_err(|cycle| ExtractError::Cycle(graph[cycle.node_id()].name.clone()))?;

        Ok(Self { graph, index })
    }

    /// Steps in planner order.
    pub fn steps(&self) -> impl Iterator<Item = &RenderStep> {
        self.graph.node_indices().map(|node| &self.graph[node])
    }

    pub fn first(&self) -> Option<&RenderStep> {
        self.steps().next()
    }

    pub fn get(&self, id: &str) -> Option<&RenderStep> {
        self.index.get(id).map(|&node| &self.graph[node])
    }

    /// The steps `step` waits for, in the order it lists them.
    pub fn dependencies<'a>(&'a self, step: &'a RenderStep) -> impl Iterator<Item = &'a RenderStep> {
        step.deps.iter().filter_map(|dep| self.get(dep))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}
