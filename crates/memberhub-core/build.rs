//! Build script that generates branding constants from branding.toml
//!
//! This reads the workspace-level branding.toml and generates Rust constants
//! that are included at compile time.

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Re-run if branding.toml changes
    println!("cargo:rerun-if-changed=../../branding.toml");

    // Find branding.toml relative to this crate (2 levels up to workspace root)
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = Path::new(&manifest_dir).parent().unwrap().parent().unwrap();
    let branding_path = workspace_root.join("branding.toml");

    let content = fs::read_to_string(&branding_path).unwrap_or_default();

    // Simple TOML parsing without external dependency
    let display_name = extract_toml_string(&content, "display_name").unwrap_or("MemberHub");
    let identifier = extract_toml_string(&content, "identifier").unwrap_or("org.memberhub.admin");
    let domain = extract_toml_string(&content, "domain").unwrap_or("memberhub.org");
    let keychain_service =
        extract_toml_string(&content, "keychain_service").unwrap_or("org.memberhub.admin");
    let log_prefix = extract_toml_string(&content, "log_prefix").unwrap_or("memberhub");
    let platform_name = extract_toml_string(&content, "platform_name").unwrap_or("SoundCloud");
    let callback_port: u16 = extract_toml_string(&content, "default_callback_port")
        .and_then(|p| p.parse().ok())
        .unwrap_or(45819);
    let callback_path =
        extract_toml_string(&content, "callback_path").unwrap_or("/oauth/callback");
    let message_path = extract_toml_string(&content, "message_path").unwrap_or("/oauth/message");

    // Generate Rust constants
    let out_dir = env::var("OUT_DIR").unwrap();
    let rust_path = Path::new(&out_dir).join("branding_generated.rs");

    let rust_code = format!(
        r#"// Auto-generated branding constants from branding.toml
// DO NOT EDIT - regenerate with `cargo build`

/// User-facing display name
pub const DISPLAY_NAME: &str = {display_name:?};

/// Reverse-domain app identifier
pub const IDENTIFIER: &str = {identifier:?};

/// Primary domain
pub const DOMAIN: &str = {domain:?};

/// Keychain/credential manager service name
pub const KEYCHAIN_SERVICE: &str = {keychain_service:?};

/// Log file prefix
pub const LOG_PREFIX: &str = {log_prefix:?};

/// Name of the connected content platform, as shown to admins
pub const PLATFORM_NAME: &str = {platform_name:?};

/// Preferred port for the loopback OAuth listener
pub const DEFAULT_OAUTH_CALLBACK_PORT: u16 = {callback_port};

/// Path the authorization server redirects to (serves the bridge page)
pub const OAUTH_CALLBACK_PATH: &str = {callback_path:?};

/// Path the bridge page posts flow messages to
pub const OAUTH_MESSAGE_PATH: &str = {message_path:?};
"#,
    );

    fs::write(&rust_path, rust_code).expect("Failed to write branding_generated.rs");
}

/// Extract a string value from TOML content (simple parser, no dependencies)
fn extract_toml_string<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with(key) {
            if let Some(eq_pos) = line.find('=') {
                if line[..eq_pos].trim() != key {
                    continue;
                }
                let value = line[eq_pos + 1..].trim();
                // Remove quotes
                if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
                    return Some(&value[1..value.len() - 1]);
                }
            }
        }
    }
    None
}
