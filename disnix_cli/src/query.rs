use super::client::RemoteClient;
use super::executor::{self, Outcome};
use super::interrupt::Interrupt;
use super::{Result, TargetRegistry};

/// Show the installed services on every target.
///
/// Queries run in parallel with captured output and are printed per target
/// in canonical order once everything has been collected, so listings from
/// different machines never interleave.
pub fn query_installed(registry: &TargetRegistry, profile: &str, interrupt: &Interrupt) -> Result<Outcome> {
    let keys: Vec<String> = registry.keys().to_vec();
    let mut listings: Vec<(String, Vec<String>)> = Vec::new();

    let outcome = executor::run(
        &keys,
        None,
        interrupt,
        |key| key.clone(),
        |key| {
            let target = registry.lookup(key)?;
            RemoteClient::new(&target.client_interface, &target.address).query_installed(profile)
        },
        |key, completion| {
            if completion.success {
                listings.push((key.clone(), completion.lines.clone()));
            } else {
                eprintln!("[target: {}]: Cannot query the installed services", key);
            }
        },
    );

    listings.sort();
    for (key, lines) in listings {
        println!("\nServices on target: {}\n", key);
        for line in lines {
            println!("{}", line);
        }
    }

    Ok(outcome)
}
