//! Device connector - the runtime half of the messaging protocol.
//!
//! [`DeviceConnector`] owns the transport and a [`ConnectorState`] inside one
//! actor task, so node changes, trackable changes, inbound actions and
//! outbound sends are handled strictly in arrival order. A separate reader
//! task per connection decodes inbound bytes and feeds them back into the
//! actor.
//!
//! ```text
//! discovery ──▶ DeviceConnector ──▶ Transport ──▶ peer
//!                    │   ▲
//!                    ▼   │ reader task
//!          stridelink-core::ConnectorState (pure)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use run_core::{ConnectorAction, ConnectorEvent, ConnectorState};
use run_types::{DeviceNode, DeviceRole, MessagingAction, MessagingError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::sources::NodeDiscovery;
use crate::task::AbortOnDrop;
use crate::transport::Transport;

/// Capacity of the inbound action fan-out.
const INBOUND_CAPACITY: usize = 64;

/// What the trackers and sessions need from the paired-device link.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Send an action to the peer.
    async fn send_action(&self, action: MessagingAction) -> Result<(), MessagingError>;

    /// Set the local trackable flag.
    async fn set_trackable(&self, trackable: bool);

    /// Subscribe to actions arriving from the peer.
    fn subscribe(&self) -> broadcast::Receiver<MessagingAction>;

    /// Watch the currently connected peer.
    fn connected_peer(&self) -> watch::Receiver<Option<DeviceNode>>;
}

enum Command {
    Nodes(Vec<DeviceNode>),
    Trackable(bool),
    Received(MessagingAction),
    Send(MessagingAction, oneshot::Sender<Result<(), MessagingError>>),
    /// The reader of connection `generation` stopped.
    Closed(u64),
}

/// Handle to a running device connector.
///
/// Dropping the handle stops the connector and its reader task.
pub struct DeviceConnector {
    commands: mpsc::UnboundedSender<Command>,
    inbound: broadcast::Sender<MessagingAction>,
    peer: watch::Receiver<Option<DeviceNode>>,
    _task: AbortOnDrop,
    _discovery: Option<AbortOnDrop>,
}

impl DeviceConnector {
    /// Start a connector for the given role over a transport.
    pub fn spawn<T: Transport>(role: DeviceRole, transport: T) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        let (peer_tx, peer) = watch::channel(None);

        let actor = ConnectorActor {
            state: ConnectorState::new(role),
            transport: Arc::new(transport),
            commands: commands.clone(),
            inbound: inbound.clone(),
            peer: peer_tx,
            reader: None,
            generation: 0,
        };
        let task = tokio::spawn(actor.run(rx));

        Self {
            commands,
            inbound,
            peer,
            _task: AbortOnDrop(task),
            _discovery: None,
        }
    }

    /// Start a connector that follows node discovery for the paired role.
    pub fn spawn_with_discovery<T: Transport>(
        role: DeviceRole,
        transport: T,
        discovery: &dyn NodeDiscovery,
    ) -> Self {
        let mut connector = Self::spawn(role, transport);
        let mut nodes = discovery.observe_nodes(role);
        let commands = connector.commands.clone();
        let task = tokio::spawn(async move {
            while let Some(reachable) = nodes.next().await {
                if commands.send(Command::Nodes(reachable)).is_err() {
                    break;
                }
            }
        });
        connector._discovery = Some(AbortOnDrop(task));
        connector
    }

    /// Feed the latest set of reachable nodes from node discovery.
    pub fn on_nodes_changed(&self, nodes: Vec<DeviceNode>) {
        self.submit(Command::Nodes(nodes));
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("device connector is no longer running");
        }
    }
}

#[async_trait]
impl PeerLink for DeviceConnector {
    async fn send_action(&self, action: MessagingAction) -> Result<(), MessagingError> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::Send(action, reply))
            .map_err(|_| MessagingError::Unknown)?;
        result.await.unwrap_or(Err(MessagingError::Unknown))
    }

    async fn set_trackable(&self, trackable: bool) {
        self.submit(Command::Trackable(trackable));
    }

    fn subscribe(&self) -> broadcast::Receiver<MessagingAction> {
        self.inbound.subscribe()
    }

    fn connected_peer(&self) -> watch::Receiver<Option<DeviceNode>> {
        self.peer.clone()
    }
}

struct ConnectorActor<T> {
    state: ConnectorState,
    transport: Arc<T>,
    commands: mpsc::UnboundedSender<Command>,
    inbound: broadcast::Sender<MessagingAction>,
    peer: watch::Sender<Option<DeviceNode>>,
    reader: Option<AbortOnDrop>,
    generation: u64,
}

impl<T: Transport> ConnectorActor<T> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!(role = ?self.state.role(), "device connector started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Nodes(nodes) => {
                    let actions = self.state.on_event(ConnectorEvent::NodesChanged(nodes));
                    self.execute(actions).await;
                }
                Command::Trackable(trackable) => {
                    let actions = self
                        .state
                        .on_event(ConnectorEvent::TrackableChanged(trackable));
                    self.execute(actions).await;
                }
                Command::Received(action) => {
                    let actions = self.state.on_event(ConnectorEvent::Received(action));
                    self.execute(actions).await;
                }
                Command::Send(action, reply) => {
                    let result = self.send(action).await;
                    let _ = reply.send(result);
                }
                Command::Closed(generation) => {
                    if generation != self.generation || self.reader.is_none() {
                        continue;
                    }
                    self.reader = None;
                    if let Err(e) = self.transport.close().await {
                        tracing::debug!(error = %e, "error closing transport");
                    }
                    self.lost_connection();
                    tracing::info!("peer connection lost");
                }
            }
        }
    }

    async fn execute(&mut self, actions: Vec<ConnectorAction>) {
        for action in actions {
            match action {
                ConnectorAction::Connect(node) => {
                    if let Err(e) = self.transport.connect(&node.id).await {
                        tracing::warn!(node = %node.id, error = %e, "failed to connect to peer");
                        self.lost_connection();
                        // The rest of the batch announces to this peer.
                        return;
                    }
                    tracing::info!(node = %node.id, name = %node.display_name, "connected to peer");
                    self.generation += 1;
                    self.reader = Some(AbortOnDrop(tokio::spawn(read_loop(
                        Arc::clone(&self.transport),
                        self.commands.clone(),
                        self.generation,
                    ))));
                    self.peer.send_replace(Some(node));
                }
                ConnectorAction::Disconnect => {
                    self.reader = None;
                    if let Err(e) = self.transport.close().await {
                        tracing::debug!(error = %e, "error closing transport");
                    }
                    self.peer.send_replace(None);
                    tracing::info!("peer disconnected");
                }
                ConnectorAction::Send(action) => {
                    if let Err(e) = self.send(action).await {
                        tracing::warn!(?action, error = %e, "protocol message not delivered");
                    }
                }
                ConnectorAction::Deliver(action) => {
                    // No subscribers is fine.
                    let _ = self.inbound.send(action);
                }
            }
        }
    }

    fn lost_connection(&mut self) {
        self.state.on_event(ConnectorEvent::Disconnected);
        self.peer.send_replace(None);
    }

    async fn send(&self, action: MessagingAction) -> Result<(), MessagingError> {
        let bytes = action.to_bytes().map_err(|e| {
            tracing::error!(error = %e, "failed to encode action");
            MessagingError::Unknown
        })?;
        self.transport.send(&bytes).await.map_err(|e| {
            tracing::debug!(?action, error = %e, "failed to send action");
            MessagingError::from(&e)
        })
    }
}

async fn read_loop<T: Transport>(
    transport: Arc<T>,
    commands: mpsc::UnboundedSender<Command>,
    generation: u64,
) {
    loop {
        match transport.recv().await {
            Ok(bytes) => match MessagingAction::from_bytes(&bytes) {
                Ok(action) => {
                    if commands.send(Command::Received(action)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable message from peer");
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "peer channel closed");
                break;
            }
        }
    }
    let _ = commands.send(Command::Closed(generation));
}
