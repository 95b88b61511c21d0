//! # stridelink-tracker
//!
//! Device-side runtime for StrideLink: live workout tracking split across a
//! primary unit and a worn companion.
//!
//! ## Features
//!
//! - **Telemetry fusion**: [`RunningTracker`] combines position fixes,
//!   elapsed-time ticks and the companion's heart rate into one segmented
//!   session snapshot
//! - **Paired-device messaging**: [`DeviceConnector`] keeps both devices'
//!   trackable state in step and relays live telemetry
//! - **Session controllers**: [`PrimarySession`] and [`CompanionSession`]
//!   mirror start/pause/finish without echo loops
//! - **Transport abstraction**: pluggable byte transport (platform data
//!   layer, mock)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stridelink_tracker::*;
//!
//! let connector = Arc::new(DeviceConnector::spawn(DeviceRole::Primary, transport));
//! let tracker = RunningTracker::spawn(
//!     FusionConfig::default(),
//!     positions,
//!     Arc::new(IntervalTicker::default()),
//!     connector.clone(),
//! );
//! let session = PrimarySession::spawn(tracker, connector);
//!
//! session.start_session();
//! session.pause_resume().await;
//! let finished = session.finish().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connector;
pub mod session;
pub mod sources;
mod task;
pub mod tracker;
pub mod transport;

pub use connector::{DeviceConnector, PeerLink};
pub use session::{
    CompanionEvent, CompanionSession, CompanionState, FinishedRun, PrimaryEvent, PrimarySession,
};
pub use sources::{ExerciseTracker, IntervalTicker, NodeDiscovery, PositionSource, Ticker};
pub use tracker::{FusionConfig, RunningTracker};
pub use transport::{MockTransport, Transport, TransportError};

pub use run_types::DeviceRole;
