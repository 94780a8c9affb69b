//! Scoped undo boundary

use tracing::trace;

use crate::infrastructure::traits::TransactionProvider;

/// Opens a transaction on construction and closes it when dropped, so every
/// exit path (including early returns) ends the undo unit.
pub struct ScopedTransaction<'a> {
    provider: &'a dyn TransactionProvider,
}

impl<'a> ScopedTransaction<'a> {
    pub fn new(provider: &'a dyn TransactionProvider, description: &str) -> Self {
        trace!(description, "begin transaction");
        provider.begin(description);
        Self { provider }
    }
}

impl Drop for ScopedTransaction<'_> {
    fn drop(&mut self) {
        self.provider.end();
        trace!("end transaction");
    }
}
