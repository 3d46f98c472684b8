use super::client::{self, RemoteClient};
use super::copy;
use super::interrupt::Interrupt;
use super::statedir::SnapshotStore;
use super::transition::{self, Fleet, Migration, TransitionFlags, TransitionStatus};
use super::{Manifest, Result};

/// Move the state of one component between two targets.
///
/// The old side is quiesced and captured first; the generation-keyed
/// transfers make every later step idempotent, so a `disnix-migrate` re-run
/// after a `DEPLOY_STATE_FAIL` picks up exactly where the failure left off.
/// `state_moved` flips as soon as the capture succeeds; from that moment on
/// an automatic rollback would lose data and is off the table.
pub fn migrate_component(
    m: &Migration,
    old_client: &RemoteClient,
    new_client: &RemoteClient,
    statedir: &SnapshotStore,
    state_moved: &mut bool,
) -> Result<()> {
    println!(
        "[target: {}]: Snapshotting state of component: {} in container: {}",
        m.from, m.component, m.container
    );
    let ok = client::wait_to_finish(old_client.snapshot(&m.container, &m.component)?)?;
    if !ok {
        bail!("cannot snapshot component {} on target {}", m.component, m.from);
    }
    *state_moved = true;

    println!(
        "[coordinator]: Transferring snapshots of component: {} from target: {}",
        m.component, m.from
    );
    // generation-keyed transfers are idempotent, so one retry is safe
    let ids = match copy::copy_snapshots_from(old_client, statedir, &m.container, &m.component, false) {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("[coordinator]: {}, retrying the transfer once...", e);
            copy::copy_snapshots_from(old_client, statedir, &m.container, &m.component, false)?
        }
    };

    println!(
        "[coordinator]: Transferring snapshots of component: {} to target: {}",
        m.component, m.to
    );
    if let Err(e) = copy::offer_snapshots_to(new_client, statedir, &ids) {
        eprintln!("[coordinator]: {}, retrying the transfer once...", e);
        copy::offer_snapshots_to(new_client, statedir, &ids)?;
    }

    println!(
        "[target: {}]: Restoring state of component: {} in container: {}",
        m.to, m.component, m.container
    );
    let ok = client::wait_to_finish(new_client.restore(&m.container, &m.component)?)?;
    if !ok {
        bail!("cannot restore component {} on target {}", m.component, m.to);
    }

    Ok(())
}

/// The standalone migration pipeline behind `disnix-migrate`.
///
/// Runs only the state movement part of a transition: snapshot, transfer,
/// restore, and optionally the deletion of obsolete state. Activation is
/// left to `disnix-activate` or the full deploy driver.
pub fn migrate_system(
    new: &Manifest,
    previous: Option<&Manifest>,
    fleet: &Fleet,
    flags: &TransitionFlags,
    statedir: &SnapshotStore,
    interrupt: &Interrupt,
) -> Result<TransitionStatus> {
    let plan = transition::diff(new, previous, flags)?;

    if plan.migrate.is_empty() {
        println!("[coordinator]: No state needs to be migrated");
        return Ok(TransitionStatus::Succeeded);
    }

    let mut state_moved = false;
    for m in &plan.migrate {
        if interrupt.is_set() {
            eprintln!("[coordinator]: The migration has been interrupted");
            return Ok(failure_class(state_moved));
        }
        let old_client = fleet.client_for(&m.from)?;
        let new_client = fleet.client_for(&m.to)?;
        if let Err(e) = migrate_component(m, &old_client, &new_client, statedir, &mut state_moved) {
            eprintln!("[coordinator]: {}", e);
            return Ok(failure_class(state_moved));
        }
    }

    if flags.delete_state {
        for m in &plan.migrate {
            println!(
                "[target: {}]: Deleting obsolete state of component: {} in container: {}",
                m.from, m.component, m.container
            );
            let client = fleet.client_for(&m.from)?;
            let ok = client::wait_to_finish(client.delete_state(&m.container, &m.component)?)?;
            if !ok {
                eprintln!(
                    "[target: {}]: Cannot delete obsolete state of component: {}",
                    m.from, m.component
                );
            }
        }
    }

    Ok(TransitionStatus::Succeeded)
}

fn failure_class(state_moved: bool) -> TransitionStatus {
    if state_moved {
        TransitionStatus::StateFailed
    } else {
        TransitionStatus::Failed
    }
}
