//! ComfyUI computation graph ("API-format workflow").
//!
//! A graph maps node ids to `{ "inputs": {...}, "class_type": "..." }`.
//! Inputs are either literals or links `["<producer id>", <output slot>]`.
//!
//! Node ids are assigned by [`ComputationGraph::add_node`] in creation
//! order, and links can only be made from the [`NodeRef`] it returns, so a
//! graph built through this API never references a node that does not yet
//! exist. [`ComputationGraph::validate`] re-checks that ordering for graphs
//! assembled from refs of mixed origin.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Link to one output slot of an existing node. Serializes as `["id", slot]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeRef(String, u32);

impl EdgeRef {
    pub fn node_id(&self) -> &str {
        &self.0
    }

    pub fn slot(&self) -> u32 {
        self.1
    }
}

/// Handle to a node already inserted into a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    id: String,
}

impl NodeRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Link to output `slot` of this node.
    pub fn output(&self, slot: u32) -> EdgeRef {
        EdgeRef(self.id.clone(), slot)
    }
}

/// A single node input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Input {
    Link(EdgeRef),
    Value(Value),
}

impl Input {
    pub fn as_link(&self) -> Option<&EdgeRef> {
        match self {
            Input::Link(edge) => Some(edge),
            Input::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Input::Value(v) => Some(v),
            Input::Link(_) => None,
        }
    }
}

/// Named inputs of a node, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NodeInputs(IndexMap<String, Input>);

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), Input::Value(value.into()));
        self
    }

    pub fn link(mut self, name: &str, edge: EdgeRef) -> Self {
        self.0.insert(name.to_string(), Input::Link(edge));
        self
    }

    /// Add every entry of a JSON object as a literal input. Non-object
    /// values are ignored.
    pub fn values(mut self, values: Value) -> Self {
        if let Value::Object(map) = values {
            for (name, value) in map {
                self.0.insert(name, Input::Value(value));
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Input> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All link inputs as `(input name, edge)`.
    pub fn links(&self) -> impl Iterator<Item = (&str, &EdgeRef)> {
        self.iter()
            .filter_map(|(name, input)| input.as_link().map(|edge| (name, edge)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub inputs: NodeInputs,
    pub class_type: String,
}

impl Node {
    /// Literal value of input `name`, if present and not a link.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).and_then(Input::as_value)
    }

    /// Link held by input `name`, if present and a link.
    pub fn link(&self, name: &str) -> Option<&EdgeRef> {
        self.inputs.get(name).and_then(Input::as_link)
    }
}

/// Errors reported by [`ComputationGraph::validate`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("node {consumer} input '{input}' links to unknown node {producer}")]
    UnknownProducer {
        consumer: String,
        input: String,
        producer: String,
    },

    #[error("node {consumer} input '{input}' links to node {producer} created after it")]
    ForwardLink {
        consumer: String,
        input: String,
        producer: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ComputationGraph {
    nodes: IndexMap<String, Node>,
}

impl ComputationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its handle. Ids are `"1"`, `"2"`, ... in
    /// creation order.
    pub fn add_node(&mut self, class_type: &str, inputs: NodeInputs) -> NodeRef {
        debug_assert!(
            inputs.links().all(|(_, e)| self.nodes.contains_key(e.node_id())),
            "links must point at existing nodes",
        );
        let id = (self.nodes.len() + 1).to_string();
        self.nodes.insert(
            id.clone(),
            Node {
                inputs,
                class_type: class_type.to_string(),
            },
        );
        NodeRef { id }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    /// Nodes of a given class, in creation order.
    pub fn nodes_of<'a>(&'a self, class_type: &'a str) -> impl Iterator<Item = (&'a str, &'a Node)> {
        self.nodes().filter(move |(_, node)| node.class_type == class_type)
    }

    /// Position of `id` in creation order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.nodes.get_index_of(id)
    }

    /// Check that every link points at a node created strictly before the
    /// node holding it.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (index, (id, node)) in self.nodes.iter().enumerate() {
            for (input, edge) in node.inputs.links() {
                match self.nodes.get_index_of(edge.node_id()) {
                    None => {
                        return Err(GraphError::UnknownProducer {
                            consumer: id.clone(),
                            input: input.to_string(),
                            producer: edge.node_id().to_string(),
                        })
                    }
                    Some(producer) if producer >= index => {
                        return Err(GraphError::ForwardLink {
                            consumer: id.clone(),
                            input: input.to_string(),
                            producer: edge.node_id().to_string(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_follow_creation_order() {
        let mut graph = ComputationGraph::new();
        let a = graph.add_node("A", NodeInputs::new());
        let b = graph.add_node("B", NodeInputs::new().link("in", a.output(0)));
        assert_eq!(a.id(), "1");
        assert_eq!(b.id(), "2");
        assert_eq!(graph.position("2"), Some(1));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn serializes_to_comfyui_api_format() {
        let mut graph = ComputationGraph::new();
        let loader = graph.add_node("VAELoader", NodeInputs::new().value("vae_name", "ae.safetensors"));
        graph.add_node(
            "VAEDecode",
            NodeInputs::new().link("vae", loader.output(0)).value("tiled", false),
        );

        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(
            json,
            json!({
                "1": {"inputs": {"vae_name": "ae.safetensors"}, "class_type": "VAELoader"},
                "2": {"inputs": {"vae": ["1", 0], "tiled": false}, "class_type": "VAEDecode"},
            })
        );
    }

    #[test]
    fn values_merges_object_entries() {
        let inputs = NodeInputs::new().values(json!({"steps": 4, "cfg": 1}));
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs.get("steps").and_then(Input::as_value), Some(&json!(4)));
        assert!(NodeInputs::new().values(json!([1, 2])).is_empty());
    }

    #[test]
    fn validate_rejects_links_into_foreign_graph_nodes() {
        let mut other = ComputationGraph::new();
        other.add_node("A", NodeInputs::new());
        let foreign = other.add_node("B", NodeInputs::new());

        let mut graph = ComputationGraph::new();
        // Bypass add_node's debug check by building the node map directly.
        graph.nodes.insert(
            "1".to_string(),
            Node {
                inputs: NodeInputs::new().link("in", foreign.output(0)),
                class_type: "C".to_string(),
            },
        );

        assert_eq!(
            graph.validate(),
            Err(GraphError::UnknownProducer {
                consumer: "1".into(),
                input: "in".into(),
                producer: "2".into(),
            })
        );
    }

    #[test]
    fn validate_rejects_self_links() {
        let mut graph = ComputationGraph::new();
        graph.nodes.insert(
            "1".to_string(),
            Node {
                inputs: NodeInputs::new().link("in", EdgeRef("1".into(), 0)),
                class_type: "Loop".to_string(),
            },
        );
        assert!(matches!(graph.validate(), Err(GraphError::ForwardLink { .. })));
    }
}
