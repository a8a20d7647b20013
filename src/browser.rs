//! Discovering and spawning a Chrome binary, and talking to its HTTP
//! discovery endpoints (`/json/version`, `/json/list`).
//!
//! Launching Chrome itself is an external collaborator as far as spec §1 is
//! concerned ("spawn a detached process, wait, then connect") — this module
//! is the thin, named interface to that collaborator, grounded on
//! chromiumoxide's own `default_executable`/launch-flags approach
//! (`src/browser.rs`, `src/handler/browser.rs` in the teacher).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command as ProcessCommand;

use crate::error::{CdpError, Result};

/// Fixed wait after spawning Chrome before attempting to connect (spec §4.F, §6).
pub const LAUNCH_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
    #[serde(rename = "Browser")]
    pub browser: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetListEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Fetches `http://host:port/json/version` to discover the browser-level
/// WebSocket URL (spec §4.F Connect, §6).
pub async fn fetch_version(host: &str, port: u16) -> Result<VersionInfo, CdpError> {
    let url = format!("http://{host}:{port}/json/version");
    let info = reqwest::get(&url).await?.json::<VersionInfo>().await?;
    Ok(info)
}

/// Fetches `http://host:port/json/list` to enumerate targets.
pub async fn fetch_target_list(host: &str, port: u16) -> Result<Vec<TargetListEntry>, CdpError> {
    let url = format!("http://{host}:{port}/json/list");
    let list = reqwest::get(&url)
        .await?
        .json::<Vec<TargetListEntry>>()
        .await?;
    Ok(list)
}

/// Options accepted by the `launch` lifecycle operation (spec §4.F).
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub port: u16,
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

/// Returns the platform-specific path to the Chrome executable (spec §6).
/// Falls back to `which` for a handful of common binary names when the
/// fixed path for this platform doesn't exist, matching chromiumoxide's own
/// `default_executable` fallback chain.
pub fn default_executable() -> std::result::Result<PathBuf, String> {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "macos")] {
            let fixed = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
            if fixed.exists() {
                return Ok(fixed);
            }
        } else if #[cfg(target_os = "windows")] {
            let fixed = PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe");
            if fixed.exists() {
                return Ok(dunce::canonicalize(fixed).unwrap_or_else(|_| PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe")));
            }
            if let Some(path) = windows_registry_path() {
                if path.exists() {
                    return Ok(path);
                }
            }
        } else {
            let fixed = PathBuf::from("google-chrome");
            if which::which(&fixed).is_ok() {
                return Ok(fixed);
            }
        }
    }

    for app in &[
        "google-chrome-stable",
        "google-chrome",
        "chromium",
        "chromium-browser",
        "chrome",
        "chrome-browser",
    ] {
        if let Ok(path) = which::which(app) {
            return Ok(path);
        }
    }

    Err("could not auto detect a chrome executable".to_string())
}

#[cfg(target_os = "windows")]
fn windows_registry_path() -> Option<PathBuf> {
    use winreg::enums::HKEY_LOCAL_MACHINE;
    use winreg::RegKey;

    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    let key = hklm
        .open_subkey(r"SOFTWARE\Microsoft\Windows\CurrentVersion\App Paths\chrome.exe")
        .ok()?;
    let path: String = key.get_value("").ok()?;
    Some(PathBuf::from(path))
}

/// Spawns Chrome detached with remote debugging enabled. The caller waits
/// [`LAUNCH_WAIT`] before connecting (spec §4.F).
pub fn spawn(opts: &LaunchOptions) -> Result<tokio::process::Child, CdpError> {
    let exe = default_executable().map_err(CdpError::msg)?;

    let user_data_dir = opts
        .user_data_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(format!("cdp-mcp-{}", opts.port)));

    let mut cmd = ProcessCommand::new(exe);
    cmd.arg(format!("--remote-debugging-port={}", opts.port))
        .arg(format!("--user-data-dir={}", user_data_dir.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--metrics-recording-only")
        .arg("--disable-default-apps");

    if opts.headless {
        cmd.arg("--headless=new");
    }
    for arg in &opts.extra_args {
        cmd.arg(arg);
    }

    // Detached: stdio is not inherited and the child is never reaped by us.
    cmd.stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(false);

    cmd.spawn().map_err(CdpError::from)
}
