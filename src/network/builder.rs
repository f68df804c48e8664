use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    codec::FormatParserRegistry,
    config::NetworkConfig,
    error::{ContextNetworkError, LimitKind},
    network::NodeNetwork,
    paths::NodeReferenceResolver,
    properties::ContextNode,
    tokens::{ModelTokenCounter, TokenCounter},
};

/// A node on the active traversal path.
#[derive(Debug)]
struct Frame {
    id: String,
    /// 0 for the root.
    depth: usize,
    next_ref: usize,
    /// Resolved ids, one per reference handled so far.
    children: Vec<String>,
    /// Reference path -> resolved id, so repeated references resolve once.
    resolved: HashMap<String, String>,
    /// Tallest completed child subtree, in nodes.
    child_height: usize,
}

impl Frame {
    fn new(id: String, depth: usize) -> Frame {
        Frame {
            id,
            depth,
            next_ref: 0,
            children: Vec::new(),
            resolved: HashMap::new(),
            child_height: 0,
        }
    }
}

/// Loads a [`NodeNetwork`] depth-first from an entry node.
///
/// Traversal uses an explicit stack rather than recursion. Nodes on the active path are tracked
/// for cycle detection, and completed nodes are memoized with the height of their subgraph so a
/// node shared by several parents is loaded once and still counted against `max_depth` from each
/// place it is reached.
///
/// Every failure aborts the build: there are no partial networks.
pub struct NodeNetworkBuilder<'a> {
    registry: &'a FormatParserRegistry,
    resolver: &'a dyn NodeReferenceResolver,
    counter: &'a dyn TokenCounter,
    forced_formats: BTreeMap<String, String>,
}

impl<'a> NodeNetworkBuilder<'a> {
    pub fn new(
        registry: &'a FormatParserRegistry,
        resolver: &'a dyn NodeReferenceResolver,
    ) -> NodeNetworkBuilder<'a> {
        NodeNetworkBuilder {
            registry,
            resolver,
            counter: &ModelTokenCounter,
            forced_formats: BTreeMap::new(),
        }
    }

    pub fn with_token_counter(mut self, counter: &'a dyn TokenCounter) -> Self {
        self.counter = counter;
        self
    }

    /// Parse the node `id` with the parser registered as `parser_name`, skipping detection.
    pub fn force_format<I: Into<String>, N: Into<String>>(mut self, id: I, parser_name: N) -> Self {
        self.forced_formats.insert(id.into(), parser_name.into());
        self
    }

    #[tracing::instrument(skip(self, config))]
    pub fn build_network(
        &self,
        root_path: &str,
        config: &NetworkConfig,
    ) -> Result<NodeNetwork, ContextNetworkError> {
        let root_id = self.resolver.resolve_entry(root_path)?;
        check_depth(0, 1, config)?;

        let mut arena: BTreeMap<String, ContextNode> = BTreeMap::new();
        let mut on_path: HashSet<String> = HashSet::new();
        let mut completed: HashMap<String, usize> = HashMap::new();
        let mut stack: Vec<Frame> = Vec::new();

        let root = self.load_node(&root_id, config)?;
        arena.insert(root_id.clone(), root);
        on_path.insert(root_id.clone());
        stack.push(Frame::new(root_id.clone(), 0));

        while let Some(frame) = stack.last_mut() {
            let reference = arena
                .get(&frame.id)
                .and_then(|node| node.references().get(frame.next_ref))
                .cloned();

            let Some(reference) = reference else {
                let Some(frame) = stack.pop() else {
                    break;
                };
                let height = frame.child_height + 1;
                if let Some(node) = arena.get_mut(&frame.id) {
                    node.attach_children(frame.children);
                }
                on_path.remove(&frame.id);
                tracing::trace!("Completed '{}' (height {height})", frame.id);
                completed.insert(frame.id, height);
                if let Some(parent) = stack.last_mut() {
                    parent.child_height = parent.child_height.max(height);
                }
                continue;
            };
            frame.next_ref += 1;

            let child_id = match frame.resolved.get(&reference.path) {
                Some(id) => id.clone(),
                None => {
                    let id = self.resolver.resolve(&reference.path, &frame.id)?;
                    tracing::debug!("'{}' in '{}' resolved to '{id}'", reference.path, frame.id);
                    frame.resolved.insert(reference.path.clone(), id.clone());
                    id
                }
            };
            let child_depth = frame.depth + 1;

            if let Some(&height) = completed.get(&child_id) {
                check_depth(child_depth, height, config)?;
                frame.child_height = frame.child_height.max(height);
                frame.children.push(child_id);
                continue;
            }

            if on_path.contains(&child_id) {
                let start = stack
                    .iter()
                    .position(|f| f.id == child_id)
                    .unwrap_or_default();
                let mut cycle: Vec<String> = stack[start..].iter().map(|f| f.id.clone()).collect();
                cycle.push(child_id);
                tracing::warn!("Reference cycle: {}", cycle.join(" -> "));
                return Err(ContextNetworkError::NodeNetworkValidation { cycle });
            }

            check_depth(child_depth, 1, config)?;
            frame.children.push(child_id.clone());

            let child = self.load_node(&child_id, config)?;
            arena.insert(child_id.clone(), child);
            if arena.len() > config.max_network_size {
                return Err(ContextNetworkError::NodeResourceLimitExceeded {
                    node: None,
                    kind: LimitKind::NetworkSize,
                    current: arena.len(),
                    maximum: config.max_network_size,
                });
            }
            on_path.insert(child_id.clone());
            stack.push(Frame::new(child_id, child_depth));
        }

        let depth = completed
            .get(&root_id)
            .map(|height| height.saturating_sub(1))
            .unwrap_or_default();
        let total_tokens = self.count_tokens(&arena, config)?;
        let network = NodeNetwork::new(
            root_id,
            arena,
            depth,
            total_tokens,
            config.token_model.clone(),
        );
        tracing::info!(
            "Built network from '{}': {} node(s), {} edge(s), depth {}, {} token(s)",
            network.root_id(),
            network.len(),
            network.edge_count(),
            network.depth(),
            network.total_tokens()
        );
        Ok(network)
    }

    /// Read, size-check and parse one node.
    fn load_node(&self, id: &str, config: &NetworkConfig) -> Result<ContextNode, ContextNetworkError> {
        let source = self.resolver.load(id)?;
        if source.len() > config.max_node_size {
            return Err(ContextNetworkError::NodeResourceLimitExceeded {
                node: Some(id.to_string()),
                kind: LimitKind::NodeSize,
                current: source.len(),
                maximum: config.max_node_size,
            });
        }
        let forced = self.forced_formats.get(id).map(|s| s.as_str());
        let parser_name = self
            .registry
            .detect_format_with_hint(&source, id, forced)?
            .to_string();
        ContextNode::parse(id.to_string(), source, &parser_name, self.registry)
    }

    fn count_tokens(
        &self,
        arena: &BTreeMap<String, ContextNode>,
        config: &NetworkConfig,
    ) -> Result<usize, ContextNetworkError> {
        let mut total = 0;
        for node in arena.values() {
            let tokens = self
                .counter
                .count_tokens_for_node(node, &config.token_model)?;
            if let Some(maximum) = config.max_tokens_per_node {
                if tokens > maximum {
                    return Err(ContextNetworkError::NodeResourceLimitExceeded {
                        node: Some(node.id().to_string()),
                        kind: LimitKind::NodeTokens,
                        current: tokens,
                        maximum,
                    });
                }
            }
            total += tokens;
        }
        if let Some(maximum) = config.max_tokens_per_network {
            if total > maximum {
                return Err(ContextNetworkError::NodeResourceLimitExceeded {
                    node: None,
                    kind: LimitKind::NetworkTokens,
                    current: total,
                    maximum,
                });
            }
        }
        Ok(total)
    }
}

/// A subgraph of `height` nodes entered at `depth` must fit within `max_depth` nodes.
fn check_depth(depth: usize, height: usize, config: &NetworkConfig) -> Result<(), ContextNetworkError> {
    let chain = depth + height;
    if chain > config.max_depth {
        tracing::warn!(
            "Reference chain of {chain} node(s) exceeds max_depth {}",
            config.max_depth
        );
        return Err(ContextNetworkError::NodeNetworkDepthExceeded {
            depth: chain,
            max_depth: config.max_depth,
        });
    }
    Ok(())
}
