use std::io;
use std::process::Child;

use super::client::{self, RemoteClient};
use super::statedir::SnapshotStore;
use super::store;
use super::Result;

/// Pump an exporter's stdout into an importer's stdin and wait for both.
fn pump(mut exporter: Child, mut importer: Child) -> Result<()> {
    {
        let out = exporter
            .stdout
            .as_mut()
            .ok_or_else(|| format_err!("exporting process has no captured output"))?;
        let sink = importer
            .stdin
            .as_mut()
            .ok_or_else(|| format_err!("importing process has no writable input"))?;
        io::copy(out, sink)?;
    }
    drop(importer.stdin.take());

    let exported = exporter.wait()?;
    let imported = importer.wait()?;
    if !exported.success() {
        bail!("archive export failed with {}", exported);
    }
    if !imported.success() {
        bail!("archive import failed with {}", imported);
    }
    Ok(())
}

/// Send the intra-dependency closure of local store paths to a target.
///
/// The receiving side reports which paths it is missing first, so re-runs
/// only move what is absent.
pub fn copy_closure_to(client: &RemoteClient, paths: &[String]) -> Result<()> {
    let closure = store::query_requisites(paths)?;
    let invalid = client::capture_lines(client.print_invalid(&closure)?)?;

    if invalid.is_empty() {
        info!("all {} paths already present on {}", closure.len(), client.target);
        return Ok(());
    }

    debug!("serialising {} missing paths for {}", invalid.len(), client.target);
    pump(store::export(&invalid)?, client.import()?)
}

/// Fetch the closure of remote store paths into the local store.
pub fn copy_closure_from(client: &RemoteClient, paths: &[String]) -> Result<()> {
    let closure = client::capture_lines(client.query_requisites(paths)?)?;

    let mut missing = Vec::new();
    for path in closure {
        if !store::check_validity(&path)? {
            missing.push(path);
        }
    }
    if missing.is_empty() {
        info!("all paths from {} already present locally", client.target);
        return Ok(());
    }

    pump(client.export(&missing)?, store::import()?)
}

/// Pull snapshot generations of one component into the local state store.
///
/// Returns every identifier the target offered; identifiers the store
/// already holds are not transferred again, making re-runs no-ops.
pub fn copy_snapshots_from(
    client: &RemoteClient,
    statedir: &SnapshotStore,
    container: &str,
    component: &str,
    all: bool,
) -> Result<Vec<String>> {
    let ids = if all {
        client::capture_lines(client.query_all_snapshots(container, component)?)?
    } else {
        client::capture_lines(client.query_latest_snapshot(container, component)?)?
    };

    let missing = statedir.missing(&ids)?;
    if missing.is_empty() {
        debug!("no snapshot generations to fetch from {}", client.target);
        return Ok(ids);
    }

    let remote_paths = client::capture_lines(client.resolve_snapshots(&missing)?)?;
    if remote_paths.len() != missing.len() {
        bail!(
            "target {} resolved {} of {} snapshots",
            client.target,
            remote_paths.len(),
            missing.len()
        );
    }

    for (id, remote) in missing.iter().zip(remote_paths.iter()) {
        let mut exporter = client.export(&[remote.clone()])?;
        let mut staged = statedir.stage(id)?;
        {
            let out = exporter
                .stdout
                .as_mut()
                .ok_or_else(|| format_err!("exporting process has no captured output"))?;
            io::copy(out, &mut staged.file)?;
        }
        let status = exporter.wait()?;
        if !status.success() {
            bail!("snapshot export of {} from {} failed with {}", id, client.target, status);
        }
        staged.commit()?;
    }

    Ok(ids)
}

/// Push locally held snapshot generations of one component to a target.
///
/// Enumerates the local store; migrations that already know the exact
/// generation set use `offer_snapshots_to` instead.
pub fn copy_snapshots_to(
    client: &RemoteClient,
    statedir: &SnapshotStore,
    container: &str,
    component: &str,
    all: bool,
) -> Result<Vec<String>> {
    let mut ids = statedir.local_snapshots(container, component)?;
    if !all {
        // only offer the newest generation
        ids = ids.into_iter().last().into_iter().collect();
    }
    offer_snapshots_to(client, statedir, &ids)
}

/// Push the given locally held snapshot generations to a target.
///
/// The target reports which generations it is missing; everything else is
/// left untouched.
pub fn offer_snapshots_to(client: &RemoteClient, statedir: &SnapshotStore, ids: &[String]) -> Result<Vec<String>> {
    if ids.is_empty() {
        debug!("no snapshot generations to offer to {}", client.target);
        return Ok(Vec::new());
    }

    let missing = client::capture_lines(client.print_missing_snapshots(ids)?)?;
    for id in &missing {
        let mut archive = statedir.read(id)?;
        let mut importer = client.import()?;
        {
            let sink = importer
                .stdin
                .as_mut()
                .ok_or_else(|| format_err!("importing process has no writable input"))?;
            io::copy(&mut archive, sink)?;
        }
        drop(importer.stdin.take());
        let status = importer.wait()?;
        if !status.success() {
            bail!("snapshot import of {} on {} failed with {}", id, client.target, status);
        }
    }

    Ok(missing)
}
