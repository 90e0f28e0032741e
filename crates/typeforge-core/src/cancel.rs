//! Cooperative cancellation of a generation run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag asking a run to stop.
///
/// The resolver checks it before every provider query and the export driver
/// before starting each module, so a module that is in flight stops at its
/// next query boundary and no half-resolved type is ever emitted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken
{
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancellationToken
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// A token that is cancelled when either it or `self` is.
    ///
    /// Cancelling the child leaves `self` untouched.
    #[must_use]
    pub fn child(&self) -> Self
    {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self)
    {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool
    {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_clones_share_state()
    {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent_only()
    {
        let parent = CancellationToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }
}
