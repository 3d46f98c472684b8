use std::path::PathBuf;

use super::client::RemoteClient;
use super::executor::{self, Outcome};
use super::interrupt::Interrupt;
use super::profiles;
use super::{DistributionMapping, Manifest, Result, Sections, TargetRegistry};

/// Acquire the deployment lock on every target.
///
/// Acquisitions run in parallel and the acquired set is accumulated as
/// completions fire. If any acquisition fails, or the token trips while the
/// phase is draining, every acquired lock is released again before this
/// returns; the next stage must never start after a partial acquisition.
pub fn lock(manifest: &Manifest, registry: &TargetRegistry, profile: &str, interrupt: &Interrupt) -> Result<Outcome> {
    let items: Vec<DistributionMapping> = manifest.distribution.mapping.clone();
    let mut acquired: Vec<DistributionMapping> = Vec::new();

    let outcome = executor::run(
        &items,
        None,
        interrupt,
        |item| item.target.clone(),
        |item| {
            let target = registry.lookup(&item.target)?;
            println!("[target: {}]: Acquiring a lock on profile: {}", item.target, profile);
            RemoteClient::new(&target.client_interface, &target.address).lock(profile)
        },
        |item, completion| {
            if completion.success {
                acquired.push(item.clone());
            } else {
                eprintln!("[target: {}]: Cannot lock profile: {}", item.target, profile);
            }
        },
    );

    if outcome == Outcome::Interrupted {
        eprintln!("[coordinator]: The lock phase has been interrupted, unlocking all targets again...");
    }
    if !outcome.succeeded() {
        release(&acquired, registry, profile);
    }

    Ok(outcome)
}

/// Release the deployment lock on every target.
///
/// Used at the end of a deployment; failures are reported but the stale lock
/// is left for the next run to force-release.
pub fn unlock(manifest: &Manifest, registry: &TargetRegistry, profile: &str) -> Result<Outcome> {
    Ok(release(&manifest.distribution.mapping, registry, profile))
}

/// The `disnix-lock` pipeline.
///
/// Locks or unlocks the fleet described by the given manifest, or by the
/// last deployed configuration when no manifest is provided.
pub fn lock_or_unlock(
    do_lock: bool,
    manifest_file: Option<&str>,
    coordinator_profile_dir: &PathBuf,
    profile: &str,
    interface: &str,
    target_property: &str,
) -> Result<i32> {
    let file = match manifest_file
        .map(PathBuf::from)
        .or_else(|| profiles::determine_manifest_to_open(None, coordinator_profile_dir, profile))
    {
        Some(f) => f,
        None => {
            eprintln!("[coordinator]: Cannot open any manifest file!");
            eprintln!("[coordinator]: Please provide a valid manifest as command-line parameter!");
            return Ok(1);
        }
    };

    let manifest = match Manifest::load(&file, Sections::distribution_only()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };
    let registry = TargetRegistry::build(&manifest.infrastructure.target, interface, target_property)?;

    let interrupt = Interrupt::arm();
    let outcome = if do_lock {
        lock(&manifest, &registry, profile, &interrupt)?
    } else {
        unlock(&manifest, &registry, profile)?
    };
    interrupt.disarm();

    Ok(if outcome.succeeded() { 0 } else { 1 })
}

fn release(items: &[DistributionMapping], registry: &TargetRegistry, profile: &str) -> Outcome {
    // the bail-out must run to completion even mid-interrupt
    executor::run(
        items,
        None,
        &Interrupt::new(),
        |item| item.target.clone(),
        |item| {
            let target = registry.lookup(&item.target)?;
            println!("[target: {}]: Releasing a lock on profile: {}", item.target, profile);
            RemoteClient::new(&target.client_interface, &target.address).unlock(profile)
        },
        |item, completion| {
            if !completion.success {
                eprintln!("[target: {}]: Cannot unlock profile: {}", item.target, profile);
            }
        },
    )
}
