use std::io::Read;
use std::process::{Child, Command, Stdio};

use super::Result;

/// Dispatcher around a client interface executable.
///
/// Every operation forks `INTERFACE --target ADDRESS VERB ARGS…` and stays
/// opaque about the transport behind it. Status verbs inherit stdout; query
/// verbs pipe it for capture; the import/export pair streams an archive over
/// stdin resp. stdout. Standard error is always inherited so remote
/// diagnostics reach the operator.
#[derive(Clone, Debug)]
pub struct RemoteClient {
    pub interface: String,
    pub target: String,
}

impl RemoteClient {
    pub fn new(interface: &str, target: &str) -> RemoteClient {
        RemoteClient {
            interface: interface.to_string(),
            target: target.to_string(),
        }
    }

    fn verb(&self, verb: &str) -> Command {
        let mut cmd = Command::new(&self.interface);
        cmd.arg("--target").arg(&self.target).arg(verb);
        cmd
    }

    fn spawn_status(&self, mut cmd: Command) -> Result<Child> {
        cmd.spawn()
            .map_err(|e| format_err!("cannot execute client interface {}: {}", self.interface, e))
    }

    fn spawn_captured(&self, mut cmd: Command) -> Result<Child> {
        cmd.stdout(Stdio::piped());
        self.spawn_status(cmd)
    }

    // status verbs

    pub fn lock(&self, profile: &str) -> Result<Child> {
        let mut cmd = self.verb("lock");
        cmd.arg(profile);
        self.spawn_status(cmd)
    }

    pub fn unlock(&self, profile: &str) -> Result<Child> {
        let mut cmd = self.verb("unlock");
        cmd.arg(profile);
        self.spawn_status(cmd)
    }

    pub fn set(&self, profile: &str, path: &str) -> Result<Child> {
        let mut cmd = self.verb("set");
        cmd.arg(profile).arg(path);
        self.spawn_status(cmd)
    }

    pub fn activate(&self, activation_type: &str, container: &str, pkg: &str, env: &[(String, String)]) -> Result<Child> {
        let mut cmd = self.verb("activate");
        cmd.arg(activation_type).arg(container).arg(pkg);
        for (k, v) in env {
            cmd.arg(format!("{}={}", k, v));
        }
        self.spawn_status(cmd)
    }

    pub fn deactivate(&self, activation_type: &str, container: &str, pkg: &str, env: &[(String, String)]) -> Result<Child> {
        let mut cmd = self.verb("deactivate");
        cmd.arg(activation_type).arg(container).arg(pkg);
        for (k, v) in env {
            cmd.arg(format!("{}={}", k, v));
        }
        self.spawn_status(cmd)
    }

    pub fn snapshot(&self, container: &str, component: &str) -> Result<Child> {
        let mut cmd = self.verb("snapshot");
        cmd.arg(container).arg(component);
        self.spawn_status(cmd)
    }

    pub fn restore(&self, container: &str, component: &str) -> Result<Child> {
        let mut cmd = self.verb("restore");
        cmd.arg(container).arg(component);
        self.spawn_status(cmd)
    }

    pub fn delete_state(&self, container: &str, component: &str) -> Result<Child> {
        let mut cmd = self.verb("delete-state");
        cmd.arg(container).arg(component);
        self.spawn_status(cmd)
    }

    pub fn collect_garbage(&self, delete_old: bool) -> Result<Child> {
        let mut cmd = self.verb("collect-garbage");
        if delete_old {
            cmd.arg("--delete-old");
        }
        self.spawn_status(cmd)
    }

    pub fn clean_snapshots(&self, keep: u32, container: Option<&str>, component: Option<&str>) -> Result<Child> {
        let mut cmd = self.verb("clean-snapshots");
        cmd.arg(keep.to_string());
        if let Some(c) = container {
            cmd.arg(c);
        }
        if let Some(c) = component {
            cmd.arg(c);
        }
        self.spawn_status(cmd)
    }

    /// Human-readable listing; captured so parallel queries do not interleave
    pub fn query_installed(&self, profile: &str) -> Result<Child> {
        let mut cmd = self.verb("query-installed");
        cmd.arg(profile);
        self.spawn_captured(cmd)
    }

    // future verbs, stdout captured line-wise

    pub fn print_invalid(&self, paths: &[String]) -> Result<Child> {
        let mut cmd = self.verb("print-invalid");
        cmd.args(paths);
        self.spawn_captured(cmd)
    }

    pub fn query_requisites(&self, paths: &[String]) -> Result<Child> {
        let mut cmd = self.verb("query-requisites");
        cmd.args(paths);
        self.spawn_captured(cmd)
    }

    pub fn query_all_snapshots(&self, container: &str, component: &str) -> Result<Child> {
        let mut cmd = self.verb("query-all-snapshots");
        cmd.arg(container).arg(component);
        self.spawn_captured(cmd)
    }

    pub fn query_latest_snapshot(&self, container: &str, component: &str) -> Result<Child> {
        let mut cmd = self.verb("query-latest-snapshot");
        cmd.arg(container).arg(component);
        self.spawn_captured(cmd)
    }

    pub fn print_missing_snapshots(&self, ids: &[String]) -> Result<Child> {
        let mut cmd = self.verb("print-missing-snapshots");
        cmd.args(ids);
        self.spawn_captured(cmd)
    }

    pub fn resolve_snapshots(&self, ids: &[String]) -> Result<Child> {
        let mut cmd = self.verb("resolve-snapshots");
        cmd.args(ids);
        self.spawn_captured(cmd)
    }

    // streaming verbs

    /// Receive an archive on the remote side; the caller pumps stdin
    pub fn import(&self) -> Result<Child> {
        let mut cmd = self.verb("import");
        cmd.stdin(Stdio::piped());
        self.spawn_status(cmd)
    }

    /// Emit an archive of the given remote paths on stdout
    pub fn export(&self, paths: &[String]) -> Result<Child> {
        let mut cmd = self.verb("export");
        cmd.args(paths);
        self.spawn_captured(cmd)
    }
}

/// Wait on a status child, mapping a clean zero exit to true
pub fn wait_to_finish(mut child: Child) -> Result<bool> {
    let status = child.wait()?;
    Ok(status.success())
}

/// Wait on a future child and return its captured stdout lines.
///
/// A non-zero exit invalidates the capture, so it is an error here.
pub fn capture_lines(child: Child) -> Result<Vec<String>> {
    let mut child = child;
    let mut buffer = String::new();
    if let Some(ref mut out) = child.stdout {
        out.read_to_string(&mut buffer)?;
    }
    let status = child.wait()?;
    if !status.success() {
        bail!("client interface call failed with {}", status);
    }
    Ok(buffer.lines().filter(|l| !l.is_empty()).map(String::from).collect())
}
