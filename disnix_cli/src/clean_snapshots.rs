use super::client::RemoteClient;
use super::executor::{self, Outcome};
use super::interrupt::Interrupt;
use super::{Result, TargetRegistry};

/// Prune remote snapshot generations fleet-wide, keeping the newest `keep`
/// generations per component.
pub fn clean_snapshots(
    registry: &TargetRegistry,
    keep: u32,
    container: Option<&str>,
    component: Option<&str>,
    interrupt: &Interrupt,
) -> Result<Outcome> {
    let keys: Vec<String> = registry.keys().to_vec();
    Ok(executor::run(
        &keys,
        None,
        interrupt,
        |key| key.clone(),
        |key| {
            let target = registry.lookup(key)?;
            println!("[target: {}]: Cleaning old snapshot generations", key);
            RemoteClient::new(&target.client_interface, &target.address).clean_snapshots(keep, container, component)
        },
        |key, completion| {
            if !completion.success {
                eprintln!("[target: {}]: Cannot clean snapshot generations", key);
            }
        },
    ))
}
