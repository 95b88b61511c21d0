//! Collaborators the sync layer consumes but does not implement.
//!
//! The HTTP client, the local run repository, the session store and the
//! connectivity monitor live in the host application.

use async_trait::async_trait;
use run_types::{NetworkError, Run, RunId, UserId};

/// Remote run service.
#[async_trait]
pub trait RemoteRunDataSource: Send + Sync {
    /// All runs of the signed-in user.
    async fn list(&self) -> Result<Vec<Run>, NetworkError>;

    /// Upload a run with its route picture. Returns the run as stored remotely.
    async fn create(&self, run: &Run, image: &[u8]) -> Result<Run, NetworkError>;

    /// Delete a run remotely.
    async fn delete_by_id(&self, run_id: &RunId) -> Result<(), NetworkError>;
}

/// Local run repository.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Pull remote runs and merge them into local storage.
    async fn fetch_runs(&self) -> Result<(), NetworkError>;
}

/// Credentials of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// Account id issued at login.
    pub user_id: UserId,
}

/// Persisted login session.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// The current session, or `None` when signed out.
    async fn get(&self) -> Option<AuthInfo>;
}

/// Network availability.
pub trait Connectivity: Send + Sync {
    /// Whether jobs that need the network may run now.
    fn is_connected(&self) -> bool;
}

/// Connectivity that is always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Collaborators for a process with no remote client linked in.
///
/// Reports no connectivity, so network jobs stay queued with their attempt
/// budget untouched; remote calls fail with [`NetworkError::NoInternet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Connectivity for Offline {
    fn is_connected(&self) -> bool {
        false
    }
}

#[async_trait]
impl RemoteRunDataSource for Offline {
    async fn list(&self) -> Result<Vec<Run>, NetworkError> {
        Err(NetworkError::NoInternet)
    }

    async fn create(&self, _run: &Run, _image: &[u8]) -> Result<Run, NetworkError> {
        Err(NetworkError::NoInternet)
    }

    async fn delete_by_id(&self, _run_id: &RunId) -> Result<(), NetworkError> {
        Err(NetworkError::NoInternet)
    }
}

#[async_trait]
impl RunRepository for Offline {
    async fn fetch_runs(&self) -> Result<(), NetworkError> {
        Err(NetworkError::NoInternet)
    }
}

/// Session with a fixed user, for single-account operator tooling.
#[derive(Debug, Clone)]
pub struct StaticSession(Option<AuthInfo>);

impl StaticSession {
    /// A session signed in as `user_id`.
    pub fn signed_in(user_id: UserId) -> Self {
        Self(Some(AuthInfo { user_id }))
    }

    /// A signed-out session.
    pub fn signed_out() -> Self {
        Self(None)
    }
}

#[async_trait]
impl SessionStorage for StaticSession {
    async fn get(&self) -> Option<AuthInfo> {
        self.0.clone()
    }
}
