use std::sync::{Arc, Weak};

use async_lock::Mutex;

use crate::error::{ErrorKind, GattStatus};
use crate::ConnectionState;

pub(crate) trait BoolExt {
    /// Maps a `false` "request accepted" answer from the platform to an error of `kind`.
    fn non_false(self, kind: fn(GattStatus) -> ErrorKind) -> Result<(), crate::Error>;
}

impl BoolExt for bool {
    #[track_caller]
    fn non_false(self, kind: fn(GattStatus) -> ErrorKind) -> Result<(), crate::Error> {
        self.then_some(()).ok_or_else(|| {
            crate::Error::new(kind(GattStatus::FAILURE), "the platform refused the request")
        })
    }
}

pub(crate) trait OptionExt<T> {
    /// Explains a missing attribute: a dropped link, an unfinished discovery, or an
    /// identifier that the peripheral doesn't have.
    fn ok_or_check_conn(self, state: ConnectionState) -> Result<T, crate::Error>;
}

impl<T> OptionExt<T> for Option<T> {
    #[track_caller]
    fn ok_or_check_conn(self, state: ConnectionState) -> Result<T, crate::Error> {
        self.ok_or_else(|| match state {
            ConnectionState::Ready => ErrorKind::NotFound.into(),
            ConnectionState::Connected | ConnectionState::DiscoveringServices => {
                crate::Error::new(ErrorKind::NotReady, "services have not been discovered")
            }
            _ => ErrorKind::NotConnected.into(),
        })
    }
}

/// Weakly held observers; an observer that has been dropped is pruned on the next use.
pub(crate) struct ObserverList<O: ?Sized> {
    entries: Mutex<Vec<Weak<O>>>,
}

impl<O: ?Sized> ObserverList<O> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Registers `observer` unless it is already registered.
    pub fn register(&self, observer: Weak<O>) {
        let mut entries = self.entries.lock_blocking();
        let ptr = observer.as_ptr().cast::<()>();
        if !entries.iter().any(|w| w.as_ptr().cast::<()>() == ptr) {
            entries.push(observer);
        }
    }

    /// Removes the observer living at `ptr`.
    pub fn unregister(&self, ptr: *const ()) {
        self.entries
            .lock_blocking()
            .retain(|w| w.as_ptr().cast::<()>() != ptr && w.strong_count() > 0);
    }

    /// Live observers, to be called after the list lock is released.
    pub fn snapshot(&self) -> Vec<Arc<O>> {
        let mut entries = self.entries.lock_blocking();
        entries.retain(|w| w.strong_count() > 0);
        entries.iter().filter_map(Weak::upgrade).collect()
    }
}
