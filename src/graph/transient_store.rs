use std::collections::HashMap;

use anyhow::{anyhow, bail};
use serde::Serialize;
use tracing::trace;

use crate::graph::model::{Edge, Node, NodeId, NodeKey, Relation};
use crate::graph::store::GraphStore;

#[derive(Serialize)]
struct IdentifiedNode<'a> {
    id: NodeId,
    #[serde(flatten)]
    node: &'a Node,
}

#[derive(Serialize)]
struct GraphDocument<'a> {
    nodes: Vec<IdentifiedNode<'a>>,
    edges: &'a [Edge],
}

/// in-memory graph store, neither optimized nor particularly robust - for tests and one-shot runs
#[derive(Default)]
pub struct TransientGraphStore {
    nodes: Vec<Node>,
    keys: HashMap<NodeKey, NodeId>,
    edges: Vec<Edge>,
    outgoing: HashMap<NodeId, Vec<usize>>,
    flush_count: usize,
}

impl TransientGraphStore {
    pub fn new() -> TransientGraphStore {
        Default::default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u64), n))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        let document = GraphDocument {
            nodes: self.nodes().map(|(id, node)| IdentifiedNode { id, node }).collect(),
            edges: &self.edges,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    fn index(&self, id: NodeId) -> anyhow::Result<usize> {
        let index = id.0 as usize;
        if index < self.nodes.len() {
            Ok(index)
        }
        else {
            Err(anyhow!("node {} does not exist", id))
        }
    }
}

impl GraphStore for TransientGraphStore {
    fn find(&self, key: &NodeKey) -> anyhow::Result<Option<NodeId>> {
        Ok(self.keys.get(key).copied())
    }

    fn create(&mut self, key: NodeKey, node: Node) -> anyhow::Result<NodeId> {
        if self.keys.contains_key(&key) {
            bail!("a node with key {:?} exists already", key);
        }
        let id = NodeId(self.nodes.len() as u64);
        trace!("creating node {} for {:?}", id, key);
        self.nodes.push(node);
        self.keys.insert(key, id);
        Ok(id)
    }

    fn get(&self, id: NodeId) -> anyhow::Result<Option<Node>> {
        Ok(self.nodes.get(id.0 as usize).cloned())
    }

    fn update(&mut self, id: NodeId, node: Node) -> anyhow::Result<()> {
        let index = self.index(id)?;
        self.nodes[index] = node;
        Ok(())
    }

    fn relate(&mut self, from: NodeId, relation: Relation, to: NodeId) -> anyhow::Result<bool> {
        self.index(from)?;
        self.index(to)?;
        if self.has_relation(from, &relation, to)? {
            return Ok(false);
        }

        self.outgoing.entry(from).or_default().push(self.edges.len());
        self.edges.push(Edge { from, relation, to });
        Ok(true)
    }

    fn outgoing(&self, from: NodeId) -> anyhow::Result<Vec<(Relation, NodeId)>> {
        Ok(self.outgoing.get(&from)
            .map(|indices| indices.iter()
                .map(|&i| (self.edges[i].relation.clone(), self.edges[i].to))
                .collect())
            .unwrap_or_default())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.flush_count += 1;
        Ok(())
    }
}
