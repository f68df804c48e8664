//! The built context network: an id-keyed arena of [`ContextNode`]s plus a `petgraph` graph of
//! the resolved references between them.
//!
//! Networks are produced in one pass by [`NodeNetworkBuilder`] and are read-only afterwards.

use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
    Direction,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

use crate::{
    codec::FormatParserRegistry,
    config::NetworkConfig,
    error::ContextNetworkError,
    paths::{join, parent_dir, strip_fragment, FilesystemResolver},
    properties::{ContextNode, NodeFormat, ID_PREFIX},
    render::{ReferenceInliner, RenderMode, Rendered},
};

pub mod builder;

pub use builder::NodeNetworkBuilder;

/// Summary numbers of a network, as printed by `ctxnet build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub root: String,
    pub nodes: usize,
    pub edges: usize,
    pub total_size: usize,
    pub total_tokens: usize,
    pub depth: usize,
    pub token_model: String,
    pub formats: BTreeMap<NodeFormat, usize>,
}

#[derive(Debug, Clone)]
pub struct NodeNetwork {
    root: String,
    nodes: BTreeMap<String, ContextNode>,
    /// Edge weight is the number of references from source to target.
    graph: DiGraph<String, usize>,
    indices: BTreeMap<String, NodeIndex>,
    total_size: usize,
    total_tokens: usize,
    depth: usize,
    token_model: String,
}

impl NodeNetwork {
    pub(crate) fn new(
        root: String,
        nodes: BTreeMap<String, ContextNode>,
        depth: usize,
        total_tokens: usize,
        token_model: String,
    ) -> NodeNetwork {
        let mut graph = DiGraph::new();
        let mut indices = BTreeMap::new();
        for id in nodes.keys() {
            indices.insert(id.clone(), graph.add_node(id.clone()));
        }
        for node in nodes.values() {
            let source = indices[node.id()];
            for child in node.children() {
                let Some(&sink) = indices.get(child) else {
                    continue;
                };
                match graph.find_edge(source, sink) {
                    Some(edge) => graph[edge] += 1,
                    None => {
                        graph.add_edge(source, sink, 1);
                    }
                }
            }
        }
        let total_size = nodes.values().map(|n| n.raw_size()).sum();
        NodeNetwork {
            root,
            nodes,
            graph,
            indices,
            total_size,
            total_tokens,
            depth,
            token_model,
        }
    }

    /// Build the network reachable from `entry` inside the directory `root`, using the default
    /// parser registry and a [`FilesystemResolver`].
    pub fn from_directory<P: AsRef<Path>>(
        root: P,
        entry: &str,
        config: &NetworkConfig,
    ) -> Result<NodeNetwork, ContextNetworkError> {
        let registry = FormatParserRegistry::with_defaults();
        let resolver = FilesystemResolver::new(root)?;
        NodeNetworkBuilder::new(&registry, &resolver).build_network(entry, config)
    }

    pub fn root(&self) -> &ContextNode {
        &self.nodes[&self.root]
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn get(&self, id: &str) -> Option<&ContextNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &BTreeMap<String, ContextNode> {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Longest resolved reference chain from the root, in edges.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn token_model(&self) -> &str {
        &self.token_model
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Distinct children of `id` in reference order.
    pub fn children(&self, id: &str) -> Vec<&ContextNode> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut seen: Vec<&str> = Vec::new();
        for child in node.children() {
            if !seen.contains(&child.as_str()) {
                seen.push(child);
            }
        }
        seen.into_iter().filter_map(|c| self.nodes.get(c)).collect()
    }

    /// Nodes referencing `id`, ordered by id.
    pub fn parents(&self, id: &str) -> Vec<&ContextNode> {
        let Some(&idx) = self.indices.get(id) else {
            return Vec::new();
        };
        let mut parents: Vec<&ContextNode> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .filter_map(|p| self.nodes.get(&self.graph[p]))
            .collect();
        parents.sort_by(|a, b| a.id().cmp(b.id()));
        parents.dedup_by(|a, b| a.id() == b.id());
        parents
    }

    /// Every node after all the nodes it references (leaves first).
    pub fn topological_order(&self) -> Result<Vec<&ContextNode>, ContextNetworkError> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            let id = self.graph[cycle.node_id()].clone();
            ContextNetworkError::NodeNetworkValidation {
                cycle: vec![id.clone(), id],
            }
        })?;
        Ok(order
            .into_iter()
            .rev()
            .filter_map(|idx| self.nodes.get(&self.graph[idx]))
            .collect())
    }

    /// Find the node a reference written as `path` points at.
    ///
    /// Tried in order: the resolved edge of `from` for that exact reference, an exact id match,
    /// the path joined onto the directory of `from`, then nodes whose id ends with (or failing
    /// that, contains) the path. The last two are a convenience for partial paths and are
    /// ambiguous when ids share a suffix: the first match in id order wins.
    pub fn lookup(&self, path: &str, from: Option<&ContextNode>) -> Option<&ContextNode> {
        if let Some(node) = from
            .and_then(|f| f.resolved_child(path))
            .and_then(|id| self.nodes.get(id))
        {
            return Some(node);
        }
        let wanted = strip_fragment(path.strip_prefix(ID_PREFIX).unwrap_or(path)).trim();
        if wanted.is_empty() {
            return None;
        }
        if let Some(node) = self.nodes.get(wanted) {
            return Some(node);
        }
        if let Some(node) = from
            .and_then(|f| join(parent_dir(f.id()), wanted))
            .and_then(|id| self.nodes.get(&id))
        {
            return Some(node);
        }
        self.partial_match(wanted)
    }

    fn partial_match(&self, wanted: &str) -> Option<&ContextNode> {
        let tail = wanted
            .split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .collect::<Vec<_>>()
            .join("/");
        if tail.is_empty() {
            return None;
        }
        let suffix = format!("/{tail}");
        let mut candidates: Vec<&ContextNode> = self
            .nodes
            .values()
            .filter(|n| n.id() == tail || n.id().ends_with(&suffix))
            .collect();
        if candidates.is_empty() {
            candidates = self
                .nodes
                .values()
                .filter(|n| n.id().contains(&tail))
                .collect();
        }
        if candidates.len() > 1 {
            tracing::warn!(
                "'{wanted}' matches {} nodes ({}), using '{}'",
                candidates.len(),
                candidates
                    .iter()
                    .map(|n| n.id())
                    .collect::<Vec<_>>()
                    .join(", "),
                candidates[0].id()
            );
        } else if let Some(node) = candidates.first() {
            tracing::debug!("'{wanted}' matched '{}' by partial path", node.id());
        }
        candidates.first().copied()
    }

    pub fn stats(&self) -> NetworkStats {
        let mut formats = BTreeMap::new();
        for node in self.nodes.values() {
            *formats.entry(node.format()).or_insert(0) += 1;
        }
        NetworkStats {
            root: self.root.clone(),
            nodes: self.nodes.len(),
            edges: self.graph.edge_count(),
            total_size: self.total_size,
            total_tokens: self.total_tokens,
            depth: self.depth,
            token_model: self.token_model.clone(),
            formats,
        }
    }

    /// Render the root node as `target`.
    pub fn render(&self, target: NodeFormat, mode: RenderMode) -> Result<Rendered, ContextNetworkError> {
        ReferenceInliner::default().inline_references(self.root(), self, target, mode)
    }

    /// Render the node `id` as `target`.
    pub fn inline_references(
        &self,
        id: &str,
        target: NodeFormat,
        mode: RenderMode,
    ) -> Result<Rendered, ContextNetworkError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| ContextNetworkError::not_found(id, &self.root))?;
        ReferenceInliner::default().inline_references(node, self, target, mode)
    }

    pub fn render_to_string(
        &self,
        target: NodeFormat,
        mode: RenderMode,
    ) -> Result<String, ContextNetworkError> {
        self.render(target, mode)?.into_string(target)
    }
}
