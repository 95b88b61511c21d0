//! # stridelink-types
//!
//! Value types shared by every StrideLink crate.
//!
//! - [`RunId`], [`UserId`], [`NodeId`] - Identity types
//! - [`Position`], [`TimedPosition`], [`SessionSnapshot`] - Live session data
//! - [`Run`] - A completed workout record
//! - [`MessagingAction`] - Actions exchanged between paired devices
//! - [`DeviceNode`], [`DeviceRole`] - Paired device description
//! - [`NetworkError`], [`MessagingError`], [`ExerciseError`], [`CodecError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod device;
mod error;
mod ids;
mod messages;
mod run;
mod session;

pub use device::{DeviceNode, DeviceRole};
pub use error::{CodecError, ExerciseError, MessagingError, NetworkError};
pub use ids::{NodeId, RunId, UserId};
pub use messages::MessagingAction;
pub use run::Run;
pub use session::{Position, Segment, SessionSnapshot, TimedPosition};
