//! Mock transport for testing.
//!
//! Allows queueing inbound actions and capturing sent ones for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use run_types::{MessagingAction, NodeId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the connector
/// owns another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    readable: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_node: Option<NodeId>,
    connect_count: usize,
    queue_while_disconnected: bool,
    outbox: Vec<Vec<u8>>,
    sent_messages: Vec<Vec<u8>>,
    receive_queue: VecDeque<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport that rejects sends while disconnected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that holds sends made while disconnected and delivers
    /// them on the next connect.
    pub fn with_offline_queue() -> Self {
        let transport = Self::default();
        transport.inner.lock().unwrap().queue_while_disconnected = true;
        transport
    }

    /// Queue raw bytes to be returned by `recv()`.
    pub fn queue_response(&self, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.receive_queue.push_back(data);
        drop(inner);
        self.readable.notify_one();
    }

    /// Queue an action from the peer.
    pub fn queue_action(&self, action: MessagingAction) {
        let bytes = action.to_bytes().unwrap();
        self.queue_response(bytes);
    }

    /// Get all messages that were sent.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// Get all sent messages decoded as actions.
    pub fn sent_actions(&self) -> Vec<MessagingAction> {
        self.sent_messages()
            .iter()
            .filter_map(|bytes| MessagingAction::from_bytes(bytes).ok())
            .collect()
    }

    /// Get the node that was last connected to.
    pub fn connected_node(&self) -> Option<NodeId> {
        let inner = self.inner.lock().unwrap();
        inner.connected_node.clone()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.connect_count
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            readable: Arc::clone(&self.readable),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, node: &NodeId) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_node = Some(node.clone());
        inner.connect_count += 1;
        let held = std::mem::take(&mut inner.outbox);
        inner.sent_messages.extend(held);
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            if inner.queue_while_disconnected {
                inner.outbox.push(data.to_vec());
                return Ok(());
            }
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if !inner.connected {
                    return Err(TransportError::ConnectionClosed);
                }
                if let Some(data) = inner.receive_queue.pop_front() {
                    return Ok(data);
                }
            }
            self.readable.notified().await;
        }
    }

    fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        drop(inner);
        self.readable.notify_waiters();
        self.readable.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn watch() -> NodeId {
        NodeId::new("watch-1")
    }

    #[tokio::test]
    async fn mock_transport_connects() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect(&watch()).await.unwrap();

        assert!(transport.is_connected());
        assert_eq!(transport.connected_node(), Some(watch()));
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn mock_transport_sends_actions() {
        let transport = MockTransport::new();
        transport.connect(&watch()).await.unwrap();

        transport
            .send(&MessagingAction::Pause.to_bytes().unwrap())
            .await
            .unwrap();
        transport
            .send(&MessagingAction::Finish.to_bytes().unwrap())
            .await
            .unwrap();

        assert_eq!(
            transport.sent_actions(),
            vec![MessagingAction::Pause, MessagingAction::Finish]
        );
    }

    #[tokio::test]
    async fn recv_returns_queued_actions_in_order() {
        let transport = MockTransport::new();
        transport.connect(&watch()).await.unwrap();

        transport.queue_action(MessagingAction::Trackable);
        transport.queue_action(MessagingAction::HeartRateUpdate { heart_rate: 90 });

        let first = MessagingAction::from_bytes(&transport.recv().await.unwrap()).unwrap();
        let second = MessagingAction::from_bytes(&transport.recv().await.unwrap()).unwrap();
        assert_eq!(first, MessagingAction::Trackable);
        assert_eq!(second, MessagingAction::HeartRateUpdate { heart_rate: 90 });
    }

    #[tokio::test]
    async fn recv_waits_for_data() {
        let transport = MockTransport::new();
        transport.connect(&watch()).await.unwrap();

        let reader = transport.clone();
        let pending = tokio::spawn(async move { reader.recv().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        transport.queue_response(b"late".to_vec());
        let data = pending.await.unwrap().unwrap();
        assert_eq!(data, b"late");
    }

    #[tokio::test]
    async fn close_wakes_a_waiting_reader() {
        let transport = MockTransport::new();
        transport.connect(&watch()).await.unwrap();

        let reader = transport.clone();
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        transport.close().await.unwrap();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn send_without_connect_fails() {
        let transport = MockTransport::new();

        let result = transport.send(b"data").await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn offline_queue_flushes_on_connect() {
        let transport = MockTransport::with_offline_queue();

        transport
            .send(&MessagingAction::Untrackable.to_bytes().unwrap())
            .await
            .unwrap();
        assert!(transport.sent_actions().is_empty());

        transport.connect(&watch()).await.unwrap();
        assert_eq!(transport.sent_actions(), vec![MessagingAction::Untrackable]);
    }

    #[tokio::test]
    async fn forced_connect_failure() {
        let transport = MockTransport::new();
        transport.fail_next_connect("out of range");

        let result = transport.connect(&watch()).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn forced_send_failure() {
        let transport = MockTransport::new();
        transport.connect(&watch()).await.unwrap();
        transport.fail_next_send("buffer full");

        let result = transport.send(b"data").await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));

        // Next send should work
        transport.send(b"data").await.unwrap();
    }

    #[tokio::test]
    async fn mock_transport_clone_shares_state() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1.connect(&watch()).await.unwrap();
        assert!(transport2.is_connected());

        transport1.send(b"from t1").await.unwrap();
        transport2.send(b"from t2").await.unwrap();

        assert_eq!(transport1.sent_messages().len(), 2);
    }
}
