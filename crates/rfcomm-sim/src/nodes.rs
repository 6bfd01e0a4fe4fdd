use parking_lot::Mutex;
use rfcomm_core::{DeviceNodes, NodeAttributes, NodeError, NodeParent};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct NodeEntry {
    attrs: NodeAttributes,
    parent: Option<NodeParent>,
}

#[derive(Default)]
struct Table {
    nodes: BTreeMap<u16, NodeEntry>,
    unregistered: Vec<u16>,
    fail_next: Option<NodeError>,
}

/// In-memory device-node table
#[derive(Default)]
pub struct NodeTable {
    inner: Mutex<Table>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `register` fail with `err`
    pub fn fail_next_register(&self, err: NodeError) {
        self.inner.lock().fail_next = Some(err);
    }

    pub fn contains(&self, id: u16) -> bool {
        self.inner.lock().nodes.contains_key(&id)
    }

    pub fn attributes(&self, id: u16) -> Option<NodeAttributes> {
        self.inner.lock().nodes.get(&id).map(|e| e.attrs.clone())
    }

    pub fn parent_of(&self, id: u16) -> Option<NodeParent> {
        self.inner
            .lock()
            .nodes
            .get(&id)
            .and_then(|e| e.parent.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().nodes.is_empty()
    }

    /// Ids passed to `unregister`, in call order
    pub fn unregistered(&self) -> Vec<u16> {
        self.inner.lock().unregistered.clone()
    }
}

impl DeviceNodes for NodeTable {
    fn register(&self, id: u16, attrs: &NodeAttributes) -> Result<(), NodeError> {
        let mut table = self.inner.lock();
        if let Some(err) = table.fail_next.take() {
            return Err(err);
        }
        if table.nodes.contains_key(&id) {
            return Err(NodeError::Exists(id));
        }
        table.nodes.insert(
            id,
            NodeEntry {
                attrs: attrs.clone(),
                parent: None,
            },
        );
        Ok(())
    }

    fn unregister(&self, id: u16) {
        let mut table = self.inner.lock();
        table.nodes.remove(&id);
        table.unregistered.push(id);
    }

    fn reparent(&self, id: u16, parent: Option<&NodeParent>) {
        if let Some(entry) = self.inner.lock().nodes.get_mut(&id) {
            entry.parent = parent.cloned();
        }
    }
}
