use std::process::{Child, Command, Stdio};

use super::client;
use super::Result;

/// Operations on the coordinator's own package store.
///
/// These fork the store tooling rather than linking against it, mirroring
/// how remote stores are only ever reached through the client interface.

/// Intra-dependency closure of the given local store paths
pub fn query_requisites(paths: &[String]) -> Result<Vec<String>> {
    let child = Command::new("nix-store")
        .arg("--query")
        .arg("--requisites")
        .args(paths)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| format_err!("cannot execute nix-store: {}", e))?;
    client::capture_lines(child)
}

/// Serialise the given local paths as an archive on stdout
pub fn export(paths: &[String]) -> Result<Child> {
    Command::new("nix-store")
        .arg("--export")
        .args(paths)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| format_err!("cannot execute nix-store: {}", e))
}

/// Unpack an archive streamed to stdin into the local store
pub fn import() -> Result<Child> {
    Command::new("nix-store")
        .arg("--import")
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| format_err!("cannot execute nix-store: {}", e))
}

/// Whether a path is present and valid in the local store
pub fn check_validity(path: &str) -> Result<bool> {
    let child = Command::new("nix-store")
        .arg("--check-validity")
        .arg(path)
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format_err!("cannot execute nix-store: {}", e))?;
    client::wait_to_finish(child)
}
