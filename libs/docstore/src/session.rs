//! Session factory and per-operation unit of work.

use crate::error::StoreError;
use crate::store::{DocumentSession, DocumentStore};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Long-lived component that opens working sessions against the store.
pub struct SessionFactory {
    store: Arc<dyn DocumentStore>,
}

impl SessionFactory {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Open a new session.
    ///
    /// # Errors
    /// Propagates the store's error, e.g. when it has not been initialized.
    pub fn open_session(&self) -> Result<Box<dyn DocumentSession>, StoreError> {
        self.store.open_session()
    }
}

impl fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("store", &self.store.configuration().url())
            .finish()
    }
}

/// Wraps one working session's lifecycle: begin, use, commit-or-discard.
///
/// The session is opened lazily on first use and released by [`UnitOfWork::end`]
/// or on drop. Dropping without `end` discards queued changes.
pub struct UnitOfWork {
    sessions: Arc<SessionFactory>,
    session: Mutex<Option<Box<dyn DocumentSession>>>,
    open: AtomicBool,
}

impl UnitOfWork {
    #[must_use]
    pub fn new(sessions: Arc<SessionFactory>) -> Self {
        Self {
            sessions,
            session: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    /// Mark the start of the operation. Sessions are opened lazily, so this only logs.
    pub fn begin(&self) {
        tracing::trace!("unit of work started");
    }

    /// Run `f` against this unit's session, opening it on first use.
    ///
    /// The lock is not held while `f` runs, so `f` may call back into this unit.
    /// A nested `with_session` gets a session of its own, which is released
    /// when the outer call puts its session back.
    ///
    /// # Errors
    /// Returns the error from opening the session or from `f`.
    pub fn with_session<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn DocumentSession) -> Result<T, StoreError>,
    {
        let taken = self.session.lock().take();
        let mut session = match taken {
            Some(s) => s,
            None => {
                let s = self.sessions.open_session()?;
                self.open.store(true, Ordering::Release);
                s
            }
        };

        let result = f(session.as_mut());

        if self.session.lock().replace(session).is_some() {
            tracing::debug!("nested unit of work session released");
        }
        result
    }

    /// Whether a session has been opened and not yet released.
    #[must_use]
    pub fn has_open_session(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Finish the operation: commit queued changes if it succeeded, then release the session.
    ///
    /// # Errors
    /// Returns the error from `save_changes`; the session is released either way.
    pub fn end(&self, succeeded: bool) -> Result<(), StoreError> {
        let Some(mut session) = self.session.lock().take() else {
            return Ok(());
        };
        self.open.store(false, Ordering::Release);
        if succeeded {
            session.save_changes()?;
        } else if session.has_changes() {
            tracing::debug!("unit of work failed, discarding queued changes");
        }
        Ok(())
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("has_open_session", &self.has_open_session())
            .finish_non_exhaustive()
    }
}
