//! Fixed-window counter state.

use parking_lot::Mutex;

/// Mutable window state. Guarded as one unit so that the
/// increment-then-compare sequence is atomic per key; a bare
/// read-modify-write would under-count under concurrent load.
#[derive(Debug)]
struct WindowState {
    count: u64,
    started_at_ms: u64,
}

/// Result of registering one hit against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Whether the hit stayed within capacity.
    pub allowed: bool,
    /// Epoch milliseconds at which the window the hit landed in
    /// started. Identifies that window when the hit is later reversed.
    pub window_started_at_ms: u64,
    /// Capacity of the window the hit was counted against.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Epoch milliseconds at which the current window resets.
    pub reset_at_ms: u64,
    /// Whole seconds (rounded up) until the window resets.
    pub retry_after_secs: u64,
}

/// A rate limit counter for a single key, using a fixed time window.
///
/// The window starts on the first hit and resets once `window_ms` has
/// elapsed; the first hit after expiry starts a fresh window.
pub struct FixedWindow {
    capacity: u64,
    window_ms: u64,
    state: Mutex<WindowState>,
}

impl FixedWindow {
    pub fn new(capacity: u64, window_ms: u64, now_ms: u64) -> Self {
        Self {
            capacity,
            window_ms,
            state: Mutex::new(WindowState {
                count: 0,
                started_at_ms: now_ms,
            }),
        }
    }

    /// Count one hit at `now_ms` and report whether it fit the quota.
    pub fn hit(&self, now_ms: u64) -> WindowSnapshot {
        let mut state = self.state.lock();

        if now_ms >= state.started_at_ms + self.window_ms {
            state.count = 1;
            state.started_at_ms = now_ms;
        } else {
            state.count += 1;
        }

        self.snapshot_locked(&state, now_ms)
    }

    /// Reverse one provisional hit. Called at request exit when the
    /// quota's skip flags say the completed outcome should not count.
    /// `window_started_at_ms` names the window the hit landed in; a
    /// no-op when that window has since rolled over, so a long request
    /// straddling the boundary never returns budget to the successor
    /// window.
    pub fn forgive(&self, window_started_at_ms: u64) {
        let mut state = self.state.lock();

        if state.started_at_ms == window_started_at_ms && state.count > 0 {
            state.count -= 1;
        }
    }

    /// Current count, honoring window expiry.
    pub fn current_count(&self, now_ms: u64) -> u64 {
        let state = self.state.lock();
        if now_ms >= state.started_at_ms + self.window_ms {
            0
        } else {
            state.count
        }
    }

    fn snapshot_locked(&self, state: &WindowState, now_ms: u64) -> WindowSnapshot {
        let reset_at_ms = state.started_at_ms + self.window_ms;
        let until_reset_ms = reset_at_ms.saturating_sub(now_ms);

        WindowSnapshot {
            allowed: state.count <= self.capacity,
            window_started_at_ms: state.started_at_ms,
            limit: self.capacity,
            remaining: self.capacity.saturating_sub(state.count),
            reset_at_ms,
            retry_after_secs: until_reset_ms.div_ceil(1000),
        }
    }
}
