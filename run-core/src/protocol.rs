//! Device connector protocol state machine.
//!
//! One machine serves both sides of the pair; the [`DeviceRole`] only picks
//! the initial trackable flag. The machine decides which peer to talk to,
//! answers liveness requests and announces trackability. It never touches
//! the transport itself: the connector in `stridelink-tracker` executes the
//! returned [`ConnectorAction`]s.

use run_types::{DeviceNode, DeviceRole, MessagingAction};

/// Events that drive the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    /// Node discovery reported the current set of reachable nodes.
    NodesChanged(Vec<DeviceNode>),
    /// The local trackable flag was set.
    TrackableChanged(bool),
    /// An action arrived from the peer.
    Received(MessagingAction),
    /// The transport failed to connect or was closed underneath us.
    Disconnected,
}

/// Instructions for the connector runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorAction {
    /// Open the transport to this node.
    Connect(DeviceNode),
    /// Close the transport to the current node.
    Disconnect,
    /// Send an action to the peer.
    Send(MessagingAction),
    /// Hand an inbound action to local subscribers.
    Deliver(MessagingAction),
}

/// Connector protocol state. NO I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorState {
    role: DeviceRole,
    trackable: bool,
    peer: Option<DeviceNode>,
}

impl ConnectorState {
    /// Create a disconnected connector with the role's default trackable flag.
    pub fn new(role: DeviceRole) -> Self {
        Self {
            role,
            trackable: role.default_trackable(),
            peer: None,
        }
    }

    /// Local role.
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Current local trackable flag.
    pub fn is_trackable(&self) -> bool {
        self.trackable
    }

    /// The peer the connector is talking to, if any.
    pub fn peer(&self) -> Option<&DeviceNode> {
        self.peer.as_ref()
    }

    /// Process an event and return the actions to execute, in order.
    pub fn on_event(&mut self, event: ConnectorEvent) -> Vec<ConnectorAction> {
        match event {
            ConnectorEvent::NodesChanged(nodes) => self.on_nodes(nodes),

            ConnectorEvent::TrackableChanged(trackable) => {
                if trackable == self.trackable {
                    return vec![];
                }
                self.trackable = trackable;
                if self.peer.is_none() {
                    // Announced on the next connect.
                    return vec![];
                }
                self.announcement()
            }

            ConnectorEvent::Received(MessagingAction::ConnectionRequest) => {
                vec![ConnectorAction::Send(MessagingAction::trackability(
                    self.trackable,
                ))]
            }

            ConnectorEvent::Received(action) => vec![ConnectorAction::Deliver(action)],

            ConnectorEvent::Disconnected => {
                // Forget the peer so the next report of it connects again.
                self.peer = None;
                vec![]
            }
        }
    }

    fn on_nodes(&mut self, nodes: Vec<DeviceNode>) -> Vec<ConnectorAction> {
        let candidate = nodes.into_iter().find(|node| node.is_nearby);

        match (self.peer.take(), candidate) {
            (None, None) => vec![],
            (Some(_), None) => vec![ConnectorAction::Disconnect],
            (Some(current), Some(node)) if current.id == node.id => {
                self.peer = Some(node);
                vec![]
            }
            (current, Some(node)) => {
                let mut actions = Vec::new();
                if current.is_some() {
                    actions.push(ConnectorAction::Disconnect);
                }
                actions.push(ConnectorAction::Connect(node.clone()));
                self.peer = Some(node);
                actions.extend(self.announcement());
                actions
            }
        }
    }

    fn announcement(&self) -> Vec<ConnectorAction> {
        vec![
            ConnectorAction::Send(MessagingAction::ConnectionRequest),
            ConnectorAction::Send(MessagingAction::trackability(self.trackable)),
        ]
    }
}
