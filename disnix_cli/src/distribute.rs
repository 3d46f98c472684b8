use std::process::{Child, Command};

use super::client::RemoteClient;
use super::executor::{self, Outcome};
use super::interrupt::Interrupt;
use super::{DistributionMapping, Manifest, Result, TargetRegistry};

/// Fork one closure copy for a distribution item.
fn copy_profile(interface: &str, address: &str, profile_path: &str) -> Result<Child> {
    Command::new("disnix-copy-closure")
        .arg("--to")
        .arg("--target")
        .arg(address)
        .arg("--interface")
        .arg(interface)
        .arg(profile_path)
        .spawn()
        .map_err(|e| format_err!("cannot execute disnix-copy-closure: {}", e))
}

/// Send the intra-dependency closure of every per-target profile to its
/// target, then pin each received profile with the `set` verb so it cannot
/// be collected before activation.
///
/// Closure copies run under the global transfer cap; the pinning pass only
/// respects per-target serialisation. Any failure is fatal to the deploy and
/// reported before the locking stage starts.
pub fn distribute(
    manifest: &Manifest,
    registry: &TargetRegistry,
    profile: &str,
    max_concurrent_transfers: usize,
    interrupt: &Interrupt,
) -> Result<Outcome> {
    let items: Vec<DistributionMapping> = manifest.distribution.mapping.clone();

    let outcome = executor::run(
        &items,
        Some(max_concurrent_transfers),
        interrupt,
        |item| item.target.clone(),
        |item| {
            let target = registry.lookup(&item.target)?;
            println!(
                "[target: {}]: Receiving intra-dependency closure of profile: {}",
                item.target, item.profile
            );
            copy_profile(&target.client_interface, &target.address, &item.profile)
        },
        |item, completion| {
            if !completion.success {
                eprintln!(
                    "[target: {}]: Cannot receive intra-dependency closure of profile: {}",
                    item.target, item.profile
                );
            }
        },
    );
    if !outcome.succeeded() {
        return Ok(outcome);
    }

    let outcome = executor::run(
        &items,
        None,
        interrupt,
        |item| item.target.clone(),
        |item| {
            let target = registry.lookup(&item.target)?;
            println!("[target: {}]: Initialising profile: {}", item.target, item.profile);
            RemoteClient::new(&target.client_interface, &target.address).set(profile, &item.profile)
        },
        |item, completion| {
            if !completion.success {
                eprintln!("[target: {}]: Cannot initialise profile: {}", item.target, item.profile);
            }
        },
    );

    Ok(outcome)
}
