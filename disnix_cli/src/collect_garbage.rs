use super::client::RemoteClient;
use super::executor::{self, Outcome};
use super::interrupt::Interrupt;
use super::{Result, TargetRegistry};

/// Run the remote garbage collector on every target in parallel.
pub fn collect_garbage(registry: &TargetRegistry, delete_old: bool, interrupt: &Interrupt) -> Result<Outcome> {
    let keys: Vec<String> = registry.keys().to_vec();
    Ok(executor::run(
        &keys,
        None,
        interrupt,
        |key| key.clone(),
        |key| {
            let target = registry.lookup(key)?;
            println!("[target: {}]: Running garbage collector", key);
            RemoteClient::new(&target.client_interface, &target.address).collect_garbage(delete_old)
        },
        |key, completion| {
            if !completion.success {
                eprintln!("[target: {}]: Garbage collection failed!", key);
            }
        },
    ))
}
