//! # stridelink-sync
//!
//! Offline-first synchronization of finished runs with the remote service.
//!
//! Local changes are recorded as pending entries first and pushed by
//! background jobs afterwards, so a run is never lost when the device is
//! offline or the remote service is failing:
//!
//! ```text
//!  finished run / delete            SQLite
//!  ───────────────────►  Scheduler ──────────► pending_creates
//!                            │                 pending_deletes
//!                            └─ enqueue ─────► jobs
//!                                                │ due
//!                              Worker ◄──────────┘
//!                                │ create / delete / fetch
//!                                ▼
//!                          remote service
//! ```
//!
//! - [`scheduler`] records a change and queues its job; the periodic fetch is
//!   registered at most once
//! - [`worker`] runs due jobs with an attempt budget and exponential backoff;
//!   pending entries are only cleared after remote success
//! - [`storage`] is the SQLite pending-sync store and durable job queue

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod remote;
pub mod scheduler;
pub mod storage;
pub mod worker;

pub use config::Config;
pub use error::{Result, StorageError, StorageResult, SyncError};
pub use run_types::{Run, RunId, UserId};
pub use scheduler::{ScheduleOutcome, SyncIntent, SyncScheduler};
pub use worker::{run_worker, spawn_worker, SyncExecutor};
