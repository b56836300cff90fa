//! Popup Coordinator
//!
//! Owns the lifecycle of the external authorization window: open it sized and
//! centered, poll its liveness, and close it. The window itself belongs to
//! a [`WindowHost`]; the flow controller only goes through the coordinator.

mod browser;

pub use browser::BrowserWindowHost;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Liveness could not be determined (e.g. the window is not ours to inspect).
#[derive(Debug, Clone, thiserror::Error)]
#[error("window probe failed: {0}")]
pub struct ProbeError(pub String);

/// A window opened by a [`WindowHost`].
pub trait ExternalWindow: Send + Sync {
    /// `Ok(true)` once the user (or anything else) closed the window.
    fn is_closed(&self) -> Result<bool, ProbeError>;

    fn close(&self);
}

/// Something that can open external windows.
pub trait WindowHost: Send + Sync {
    /// `None` when window creation was blocked or failed. Must not panic.
    fn open(&self, url: &str, features: &WindowFeatures) -> Option<Box<dyn ExternalWindow>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFeatures {
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
}

impl WindowFeatures {
    /// A `width`x`height` window centered on the screen.
    pub fn centered(width: u32, height: u32, screen_width: u32, screen_height: u32) -> Self {
        Self {
            width,
            height,
            left: screen_width.saturating_sub(width) / 2,
            top: screen_height.saturating_sub(height) / 2,
        }
    }
}

/// Monotonic: leaves `Open` once and never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupState {
    Open,
    Closed,
    TimedOut,
}

/// How [`PopupCoordinator::await_completion`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupCompletion {
    Closed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PopupError {
    #[error("popup {0} already has an active poll loop")]
    AlreadyPolling(u64),
    #[error("popup wait cancelled")]
    Cancelled,
}

pub struct PopupHandle {
    id: u64,
    window: Box<dyn ExternalWindow>,
    state: Mutex<PopupState>,
    polling: AtomicBool,
    window_closed: AtomicBool,
}

impl PopupHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> PopupState {
        *self.state.lock()
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    fn leave_open(&self, next: PopupState) -> bool {
        let mut state = self.state.lock();
        if *state == PopupState::Open {
            *state = next;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for PopupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopupHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Clears the polling flag however the poll loop exits.
struct PollGuard<'a>(&'a AtomicBool);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PopupCoordinator {
    host: Arc<dyn WindowHost>,
    features: WindowFeatures,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl PopupCoordinator {
    pub fn new(host: Arc<dyn WindowHost>, features: WindowFeatures, poll_interval: Duration) -> Self {
        Self {
            host,
            features,
            poll_interval,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Open the authorization window. `None` means the host refused.
    pub fn open(&self, url: &str) -> Option<Arc<PopupHandle>> {
        let Some(window) = self.host.open(url, &self.features) else {
            warn!("[Popup] Window creation was blocked");
            return None;
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        info!(
            popup_id = id,
            width = self.features.width,
            height = self.features.height,
            "[Popup] Authorization window opened"
        );

        Some(Arc::new(PopupHandle {
            id,
            window,
            state: Mutex::new(PopupState::Open),
            polling: AtomicBool::new(false),
            window_closed: AtomicBool::new(false),
        }))
    }

    /// Poll until the window closes or `timeout` elapses.
    ///
    /// At most one loop runs per handle; a second concurrent call fails with
    /// [`PopupError::AlreadyPolling`]. Probe errors are ignored, so an
    /// uninspectable window only ends by timeout or cancellation.
    pub async fn await_completion(
        &self,
        handle: &PopupHandle,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PopupCompletion, PopupError> {
        if handle.polling.swap(true, Ordering::SeqCst) {
            return Err(PopupError::AlreadyPolling(handle.id));
        }
        let _guard = PollGuard(&handle.polling);

        match handle.state() {
            PopupState::Open => {}
            PopupState::Closed => return Ok(PopupCompletion::Closed),
            PopupState::TimedOut => return Ok(PopupCompletion::TimedOut),
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(popup_id = handle.id, "[Popup] Poll loop cancelled");
                    return Err(PopupError::Cancelled);
                }
                _ = &mut deadline => {
                    handle.leave_open(PopupState::TimedOut);
                    info!(popup_id = handle.id, "[Popup] Timed out after {:?}", timeout);
                    return Ok(PopupCompletion::TimedOut);
                }
                _ = ticker.tick() => {
                    match handle.window.is_closed() {
                        Ok(true) => {
                            handle.leave_open(PopupState::Closed);
                            handle.window_closed.store(true, Ordering::SeqCst);
                            info!(popup_id = handle.id, "[Popup] Window closed by user");
                            return Ok(PopupCompletion::Closed);
                        }
                        Ok(false) => {}
                        Err(e) => trace!(popup_id = handle.id, "[Popup] Probe ignored: {}", e),
                    }
                }
            }
        }
    }

    /// Close the window. Safe to call repeatedly and on an already-closed window.
    pub fn close(&self, handle: &PopupHandle) {
        handle.leave_open(PopupState::Closed);
        if !handle.window_closed.swap(true, Ordering::SeqCst) {
            debug!(popup_id = handle.id, "[Popup] Closing window");
            handle.window.close();
        }
    }
}
