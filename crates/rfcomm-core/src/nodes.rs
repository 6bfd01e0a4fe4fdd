use crate::addr::BdAddr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// A node with this index is already registered
    #[error("Device node {0} already registered")]
    Exists(u16),

    #[error("Device node registration failed: {0}")]
    Failed(String),
}

/// Attributes published alongside a device node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub name: String,
    pub address: BdAddr,
    pub channel: u8,
}

/// Parent a node can be moved under (the baseband connection it rides on)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeParent(pub String);

/// Device-node registration (`/dev/rfcomm<N>` and its attributes).
pub trait DeviceNodes: Send + Sync {
    fn register(&self, id: u16, attrs: &NodeAttributes) -> Result<(), NodeError>;

    fn unregister(&self, id: u16);

    /// Move the node under `parent`, or to the top level when `None`
    fn reparent(&self, id: u16, parent: Option<&NodeParent>);
}
