//! Paired devices as seen by the connector.

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// A device reported by node discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceNode {
    /// Transport address.
    pub id: NodeId,
    /// Human-readable device name.
    pub display_name: String,
    /// Whether the device is currently in direct range.
    pub is_nearby: bool,
}

impl DeviceNode {
    /// Describe a discovered device.
    pub fn new(id: NodeId, display_name: impl Into<String>, is_nearby: bool) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_nearby,
        }
    }
}

/// Which side of the pair this device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceRole {
    /// The unit carried by the user; owns position tracking.
    Primary,
    /// The worn unit; supplies heart rate.
    Companion,
}

impl DeviceRole {
    /// Local trackable flag before anything has been decided.
    ///
    /// The primary only becomes trackable once it observes position; the
    /// companion is ready as soon as it runs.
    pub fn default_trackable(&self) -> bool {
        match self {
            Self::Primary => false,
            Self::Companion => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_defaults() {
        assert!(!DeviceRole::Primary.default_trackable());
        assert!(DeviceRole::Companion.default_trackable());
    }

    #[test]
    fn node_construction() {
        let node = DeviceNode::new(NodeId::new("watch-1"), "Wrist", true);
        assert_eq!(node.id.as_str(), "watch-1");
        assert_eq!(node.display_name, "Wrist");
        assert!(node.is_nearby);
    }
}
