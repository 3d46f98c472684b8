use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use regex::Regex;

use super::client::RemoteClient;
use super::executor::{self, Outcome};
use super::interrupt::Interrupt;
use super::{DistributionMapping, Manifest, Result, TargetRegistry};

/// Install the per-target profile generation on every target.
///
/// Re-running this against an already committed deployment is harmless: the
/// remote `set` verb is idempotent, which is what makes a partially
/// committed deployment recoverable by simply finishing the job.
pub fn set_target_profiles(
    manifest: &Manifest,
    registry: &TargetRegistry,
    profile: &str,
    interrupt: &Interrupt,
) -> Result<Outcome> {
    let items: Vec<DistributionMapping> = manifest.distribution.mapping.clone();
    Ok(executor::run(
        &items,
        None,
        interrupt,
        |item| item.target.clone(),
        |item| {
            let target = registry.lookup(&item.target)?;
            println!("[target: {}]: Setting profile: {}", item.target, item.profile);
            RemoteClient::new(&target.client_interface, &target.address).set(profile, &item.profile)
        },
        |item, completion| {
            if !completion.success {
                eprintln!("[target: {}]: Cannot set profile: {}", item.target, item.profile);
            }
        },
    ))
}

fn generation_links(dir: &Path, profile: &str) -> Result<Vec<(u32, PathBuf)>> {
    let re = Regex::new(&format!("^{}-([0-9]+)-link$", regex::escape(profile))).unwrap();
    let mut links = Vec::new();
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(caps) = re.captures(&name.to_string_lossy()) {
                if let Ok(n) = caps[1].parse::<u32>() {
                    links.push((n, entry.path()));
                }
            }
        }
    }
    links.sort();
    Ok(links)
}

/// Number of committed coordinator generations
pub fn generation_count(dir: &Path, profile: &str) -> Result<usize> {
    Ok(generation_links(dir, profile)?.len())
}

/// Pin a successfully deployed manifest as the next coordinator generation.
///
/// A numbered generation link is created first and the `profile` symlink is
/// switched over it atomically, so a crash between the two steps leaves the
/// old generation current and the new link as an unreferenced orphan.
pub fn set_coordinator_profile(dir: &Path, profile: &str, manifest_file: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| format_err!("cannot create coordinator profile directory {}: {}", dir.display(), e))?;

    let manifest_file = manifest_file
        .canonicalize()
        .map_err(|e| format_err!("cannot resolve manifest path {}: {}", manifest_file.display(), e))?;

    let next = generation_links(dir, profile)?.last().map(|&(n, _)| n + 1).unwrap_or(1);
    let link_name = format!("{}-{}-link", profile, next);
    let link = dir.join(&link_name);
    symlink(&manifest_file, &link)
        .map_err(|e| format_err!("cannot create generation link {}: {}", link.display(), e))?;

    let current = dir.join(profile);
    let staging = dir.join(format!(".{}-next", profile));
    // a leftover staging link from a crashed run may be dangling
    let _ = fs::remove_file(&staging);
    symlink(&link_name, &staging)?;
    fs::rename(&staging, &current)
        .map_err(|e| format_err!("cannot switch coordinator profile {}: {}", current.display(), e))?;

    info!("coordinator profile {} now at generation {}", profile, next);
    Ok(())
}

/// Resolve which manifest describes the currently deployed configuration.
///
/// An explicitly given file always wins; otherwise the newest committed
/// coordinator generation is followed. Returns nothing on a fresh
/// coordinator, which deploys treat as an installation from scratch.
pub fn determine_manifest_to_open(old_manifest: Option<&str>, dir: &Path, profile: &str) -> Option<PathBuf> {
    if let Some(path) = old_manifest {
        return Some(PathBuf::from(path));
    }
    let current = dir.join(profile);
    match current.canonicalize() {
        Ok(path) => Some(path),
        Err(_) => {
            debug!("no previously deployed configuration under {}", dir.display());
            None
        }
    }
}
