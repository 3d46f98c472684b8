use std::collections::HashSet;

use super::client::RemoteClient;
use super::executor::{self, Outcome};
use super::interrupt::Interrupt;
use super::transition::Fleet;
use super::{Manifest, Result, SnapshotMapping};

/// Remove the state of components that the current deployment no longer
/// references.
///
/// `old` is the configuration whose leftovers are cleaned; a snapshot
/// mapping of it counts as garbage when the current configuration holds no
/// mapping with the same component at the same place. Container and
/// component filters narrow the sweep.
pub fn delete_obsolete_state(
    old: &Manifest,
    current: Option<&Manifest>,
    fleet: &Fleet,
    container: Option<&str>,
    component: Option<&str>,
    interrupt: &Interrupt,
) -> Result<Outcome> {
    let live: HashSet<(String, String, String)> = current
        .map(|c| {
            c.snapshotMappings
                .mapping
                .iter()
                .map(|m| (m.component.clone(), m.container.clone(), m.target.clone()))
                .collect()
        })
        .unwrap_or_else(HashSet::new);

    let garbage: Vec<SnapshotMapping> = old
        .snapshotMappings
        .mapping
        .iter()
        .filter(|m| !live.contains(&(m.component.clone(), m.container.clone(), m.target.clone())))
        .filter(|m| container.map(|c| c == m.container).unwrap_or(true))
        .filter(|m| component.map(|c| c == m.component).unwrap_or(true))
        .cloned()
        .collect();

    if garbage.is_empty() {
        println!("[coordinator]: No obsolete state to delete");
        return Ok(Outcome::Completed);
    }

    Ok(executor::run(
        &garbage,
        None,
        interrupt,
        |m| m.target.clone(),
        |m| {
            println!(
                "[target: {}]: Deleting obsolete state of component: {} in container: {}",
                m.target, m.component, m.container
            );
            let client = fleet.client_for(&m.target)?;
            client.delete_state(&m.container, &m.component)
        },
        |m, completion| {
            if !completion.success {
                eprintln!(
                    "[target: {}]: Cannot delete obsolete state of component: {}",
                    m.target, m.component
                );
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use disnix_models::TargetRegistry;

    fn manifest(db_target: &str) -> Manifest {
        Manifest::parse(&format!(
            r#"<manifest version="1">
  <snapshotMappings>
    <mapping><service>aaaa-db</service><component>db</component><container>mysql-database</container><target>{}</target></mapping>
  </snapshotMappings>
</manifest>"#,
            db_target
        ))
        .unwrap()
    }

    #[test]
    fn kept_state_is_not_garbage() {
        let old = manifest("t1");
        let current = manifest("t1");
        let empty = TargetRegistry::default();
        let fleet = Fleet {
            new: &empty,
            previous: None,
        };
        // every mapping is still live, so no child is ever forked and the
        // missing registry entries are never consulted
        let outcome =
            delete_obsolete_state(&old, Some(&current), &fleet, None, None, &Interrupt::new()).unwrap();
        assert_eq!(outcome, Outcome::Completed);
    }
}
