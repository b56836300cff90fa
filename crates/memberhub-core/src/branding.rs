//! Centralized branding constants
//!
//! All product naming comes from this module.
//! Generated from branding.toml at build time.
//!
//! # Usage
//!
//! ```rust
//! use memberhub_core::branding;
//!
//! println!("App: {}", branding::DISPLAY_NAME);
//! let uri = branding::oauth_callback_uri_with_port(45819);
//! ```

// Include generated constants from build.rs
include!(concat!(env!("OUT_DIR"), "/branding_generated.rs"));

/// Origin of the loopback listener for a given port.
///
/// This is the "application origin" that flow messages must come from.
/// We use 127.0.0.1 (not localhost) per RFC 8252 recommendation so the
/// origin the browser reports matches byte for byte.
pub fn loopback_origin(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

/// Build a complete OAuth callback URI for loopback redirect
///
/// # Example
/// ```ignore
/// let uri = branding::oauth_callback_uri_with_port(9876);
/// // Returns: "http://127.0.0.1:9876/oauth/callback"
/// ```
pub fn oauth_callback_uri_with_port(port: u16) -> String {
    format!("{}{}", loopback_origin(port), OAUTH_CALLBACK_PATH)
}

/// Check if a URL is a loopback OAuth callback for this app
pub fn is_oauth_callback(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    parsed.scheme() == "http"
        && matches!(parsed.host_str(), Some("127.0.0.1") | Some("[::1]"))
        && parsed.path() == OAUTH_CALLBACK_PATH
}
