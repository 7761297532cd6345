use std::sync::atomic::{AtomicU64, Ordering};

/// Orders overlapping loads of one logical resource so the last one issued wins.
///
/// Every load takes a token from `issue()` before it suspends, then checks
/// `is_latest(token)` once its response is in hand. A load that lost the
/// race must drop its result instead of applying it.
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, token: u64) -> bool {
        self.current() == token
    }

    /// Most recently issued token, 0 before the first.
    pub fn current(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

/// Result of a tracked load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<T> {
    /// The response was current and is now the visible state.
    Applied(T),
    /// A newer load was issued while this one was in flight; its response
    /// was discarded.
    Superseded,
}

impl<T> LoadOutcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            LoadOutcome::Applied(value) => Some(value),
            LoadOutcome::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, LoadOutcome::Superseded)
    }
}
