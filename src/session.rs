//! Page sessions and the coordinator's non-owning view of them.
//!
//! The host owns each [`PageSession`] through an `Arc`. The coordinator only
//! ever holds a [`SessionBinding`], which wraps a `Weak` reference plus the
//! session's explicit destroyed flag, so:
//!
//! - the coordinator never keeps a session alive
//! - a result arriving after teardown is detected without touching freed state
//! - the session needs no knowledge of the coordinator

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A hosting page or navigation context.
///
/// The generation starts at 0 and is advanced by
/// [`ExtractionCoordinator::notify_loading_started`](crate::ExtractionCoordinator::notify_loading_started)
/// inside the coordinator's critical section.
///
/// # Examples
///
/// ```
/// use sitekey_core::PageSession;
///
/// let session = PageSession::new();
/// let binding = session.binding();
///
/// assert!(binding.is_valid());
/// assert_eq!(binding.current_generation(), Some(0));
///
/// session.destroy();
/// assert!(!binding.is_valid());
/// assert_eq!(binding.current_generation(), None);
/// ```
#[derive(Debug)]
pub struct PageSession {
    id: SessionId,
    generation: AtomicU64,
    destroyed: AtomicBool,
}

impl PageSession {
    /// Creates a new session at generation 0.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            generation: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Returns the session identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the current navigation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns `true` once [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Marks the session as torn down.
    ///
    /// Bindings observe this immediately, even while other `Arc`s keep the
    /// allocation alive.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    /// Creates a non-owning binding to this session.
    pub fn binding(self: &Arc<Self>) -> SessionBinding {
        SessionBinding {
            id: self.id,
            session: Arc::downgrade(self),
        }
    }

    /// Advances the generation and returns the new value.
    ///
    /// Only called with the coordinator's state lock held.
    pub(crate) fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Non-owning association from the coordinator to a [`PageSession`].
///
/// Cloning a binding is cheap and never extends the session's lifetime.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    id: SessionId,
    session: Weak<PageSession>,
}

impl SessionBinding {
    /// Identity of the bound session, available even after teardown.
    pub fn session_id(&self) -> SessionId {
        self.id
    }

    /// Returns `true` while the session is alive and not destroyed.
    pub fn is_valid(&self) -> bool {
        self.upgrade().is_some()
    }

    /// Returns the session's generation, or `None` once it is gone.
    pub fn current_generation(&self) -> Option<u64> {
        self.upgrade().map(|session| session.generation())
    }

    /// Temporarily upgrades to the live session.
    pub fn upgrade(&self) -> Option<Arc<PageSession>> {
        self.session
            .upgrade()
            .filter(|session| !session.is_destroyed())
    }
}
