//! Task ownership helper.

use tokio::task::JoinHandle;

/// Aborts the wrapped task when dropped, so a handle owns its background work.
pub(crate) struct AbortOnDrop(pub(crate) JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
