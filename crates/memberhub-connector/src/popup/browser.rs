//! Default window host: a Chromium-family browser in app-window mode, or the
//! system URL opener as a fallback.
//!
//! An app window is a child process we can watch and kill. A URL handed to
//! the system opener lands in whatever browser the user runs; we cannot see
//! that window, so its liveness probe always fails and the flow relies on the
//! callback message or the timeout.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{ExternalWindow, ProbeError, WindowFeatures, WindowHost};

const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "microsoft-edge",
    "brave-browser",
];

pub struct BrowserWindowHost {
    browser: Option<PathBuf>,
    profile_dir: Option<PathBuf>,
    allow_system_opener: bool,
}

impl BrowserWindowHost {
    /// Use `browser` if given, else the first Chromium-family browser on PATH.
    pub fn new(browser: Option<String>) -> Self {
        let browser = match browser {
            Some(cmd) => which::which(&cmd).ok().or_else(|| Some(PathBuf::from(cmd))),
            None => detect_browser(),
        };
        match &browser {
            Some(path) => info!("[Popup] Using app-window browser {}", path.display()),
            None => info!("[Popup] No app-window browser found, using system opener"),
        }
        Self {
            browser,
            profile_dir: None,
            allow_system_opener: true,
        }
    }

    /// Dedicated browser profile so the app window is its own process
    /// instead of a tab handed to an already running browser.
    pub fn with_profile_dir(mut self, dir: PathBuf) -> Self {
        self.profile_dir = Some(dir);
        self
    }

    /// Refuse to fall back to the system opener (the window would be untracked).
    pub fn without_system_opener(mut self) -> Self {
        self.allow_system_opener = false;
        self
    }

    fn spawn_app_window(&self, browser: &Path, url: &str, features: &WindowFeatures) -> Option<Child> {
        let mut cmd = Command::new(browser);
        cmd.arg(format!("--app={}", url))
            .arg(format!("--window-size={},{}", features.width, features.height))
            .arg(format!("--window-position={},{}", features.left, features.top))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.profile_dir {
            cmd.arg(format!("--user-data-dir={}", dir.display()));
        }

        match cmd.spawn() {
            Ok(child) => {
                debug!(pid = child.id(), "[Popup] Spawned app window");
                Some(child)
            }
            Err(e) => {
                warn!("[Popup] Failed to launch {}: {}", browser.display(), e);
                None
            }
        }
    }
}

impl WindowHost for BrowserWindowHost {
    fn open(&self, url: &str, features: &WindowFeatures) -> Option<Box<dyn ExternalWindow>> {
        if let Some(browser) = &self.browser {
            if let Some(child) = self.spawn_app_window(browser, url, features) {
                return Some(Box::new(AppWindow {
                    child: Mutex::new(child),
                }));
            }
        }

        if !self.allow_system_opener {
            return None;
        }

        match open::that_detached(url) {
            Ok(()) => Some(Box::new(UntrackedWindow)),
            Err(e) => {
                warn!("[Popup] System opener failed: {}", e);
                None
            }
        }
    }
}

fn detect_browser() -> Option<PathBuf> {
    BROWSER_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
}

struct AppWindow {
    child: Mutex<Child>,
}

impl ExternalWindow for AppWindow {
    fn is_closed(&self) -> Result<bool, ProbeError> {
        match self.child.lock().try_wait() {
            Ok(Some(_status)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(ProbeError(e.to_string())),
        }
    }

    fn close(&self) {
        let mut child = self.child.lock();
        if let Ok(None) = child.try_wait() {
            if let Err(e) = child.kill() {
                debug!("[Popup] Kill failed: {}", e);
            }
            let _ = child.try_wait();
        }
    }
}

struct UntrackedWindow;

impl ExternalWindow for UntrackedWindow {
    fn is_closed(&self) -> Result<bool, ProbeError> {
        Err(ProbeError("window opened by the system browser is not tracked".into()))
    }

    fn close(&self) {
        debug!("[Popup] Untracked window left for the user to close");
    }
}
