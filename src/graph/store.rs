use anyhow::anyhow;

use crate::graph::model::{Node, NodeId, NodeKey, Relation};

/// The catalog graph as seen by the scanner: nodes with an indexed identity, typed edges
///  between them.
///
/// Stores are used from a single task at a time; transactional boundaries beyond `flush` are the
///  caller's business.
pub trait GraphStore: Send {
    fn find(&self, key: &NodeKey) -> anyhow::Result<Option<NodeId>>;

    /// Fails if a node with the same key exists
    fn create(&mut self, key: NodeKey, node: Node) -> anyhow::Result<NodeId>;

    fn get(&self, id: NodeId) -> anyhow::Result<Option<Node>>;

    fn update(&mut self, id: NodeId, node: Node) -> anyhow::Result<()>;

    /// Adds an edge unless there is an edge of the same kind between the two nodes already.
    ///  Returns `true` if the edge was added.
    fn relate(&mut self, from: NodeId, relation: Relation, to: NodeId) -> anyhow::Result<bool>;

    fn outgoing(&self, from: NodeId) -> anyhow::Result<Vec<(Relation, NodeId)>>;

    fn flush(&mut self) -> anyhow::Result<()>;

    fn has_relation(&self, from: NodeId, relation: &Relation, to: NodeId) -> anyhow::Result<bool> {
        Ok(self.outgoing(from)?
            .iter()
            .any(|(r, target)| *target == to && r.is_same_kind(relation)))
    }

    fn get_existing(&self, id: NodeId) -> anyhow::Result<Node> {
        self.get(id)?
            .ok_or_else(|| anyhow!("node {} does not exist", id))
    }
}

/// Looks up the node for a key, creating it with the given constructor if it does not exist.
///  Returns the node's id and whether it was created.
pub fn get_or_create(store: &mut dyn GraphStore, key: NodeKey, create: impl FnOnce() -> Node) -> anyhow::Result<(NodeId, bool)> {
    if let Some(id) = store.find(&key)? {
        return Ok((id, false));
    }
    let id = store.create(key, create())?;
    Ok((id, true))
}
