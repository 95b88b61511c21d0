//! # stridelink-core
//!
//! Pure logic for StrideLink (no I/O, instant tests).
//!
//! This crate holds the decisions of the system without any network, disk or
//! clock access:
//! - [`distance`] - haversine distance and run statistics over segments
//! - [`fusion`] - the telemetry fusion state machine
//! - [`protocol`] - the device connector protocol, parameterized by role
//! - [`origin`] - which session intents are forwarded to the peer
//! - [`retry`] - attempt budget and backoff for sync jobs
//!
//! The async crates feed events into these machines and execute the actions
//! they return.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod distance;
pub mod fusion;
pub mod origin;
pub mod protocol;
pub mod retry;

pub use distance::{max_speed_kmh, total_distance_meters, total_elevation_meters};
pub use fusion::{ChangeFilter, CombineGate, FusionAction, FusionEvent, FusionState};
pub use origin::{outbound, Command, Origin};
pub use protocol::{ConnectorAction, ConnectorEvent, ConnectorState};
pub use retry::{JobOutcome, RetryPolicy};
