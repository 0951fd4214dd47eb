//! Holder of the one open requester session.

use std::sync::Arc;

use parking_lot::Mutex;

use super::Requester;

/// Tracks the currently open requester session.
///
/// At most one requester may be open at a time; a session registers itself
/// when it opens and cancels whatever it displaced. Pass the same registry
/// to every requester that shares the rule.
#[derive(Default)]
pub struct SessionRegistry {
    current: Mutex<Option<Arc<Requester>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session`, returning the one it replaces.
    pub fn swap(&self, session: Arc<Requester>) -> Option<Arc<Requester>> {
        self.current.lock().replace(session)
    }

    /// Currently registered session
    pub fn current(&self) -> Option<Arc<Requester>> {
        self.current.lock().clone()
    }

    /// Unregister `session` if it is still the registered one.
    pub fn clear(&self, session: &Requester) -> bool {
        let mut current = self.current.lock();
        if current
            .as_deref()
            .is_some_and(|registered| std::ptr::eq(registered, session))
        {
            *current = None;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("current", &self.current.lock().as_ref().map(|s| s.id()))
            .finish()
    }
}
