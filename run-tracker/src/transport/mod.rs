//! Transport abstraction for paired-device messaging.
//!
//! The connector talks to the peer through a pluggable byte transport
//! (the platform's wearable data layer in production, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` opens a channel to a node
//! - `send()` transmits one encoded action
//! - `recv()` waits for the next encoded action
//! - `close()` terminates the channel
//!
//! Whether a send while disconnected fails or is queued for later delivery
//! is up to the implementation.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect(&NodeId::new("watch")).await?;
//! transport.send(&MessagingAction::Pause.to_bytes()?).await?;
//! let bytes = transport.recv().await?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use run_types::{MessagingError, NodeId};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

impl From<&TransportError> for MessagingError {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::NotConnected => MessagingError::Disconnected,
            TransportError::ConnectionClosed | TransportError::SendFailed(_) => {
                MessagingError::ConnectionInterrupted
            }
            TransportError::ConnectionFailed(_) | TransportError::ReceiveFailed(_) => {
                MessagingError::Unknown
            }
        }
    }
}

/// Transport trait for exchanging encoded actions with a paired device.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a channel to the given node.
    async fn connect(&self, node: &NodeId) -> Result<(), TransportError>;

    /// Send one encoded action.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive the next encoded action.
    ///
    /// Waits until data is available or the channel closes.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the channel.
    async fn close(&self) -> Result<(), TransportError>;
}
