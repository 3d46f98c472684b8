use std::path::{Path, PathBuf};

use super::executor::Outcome;
use super::interrupt::Interrupt;
use super::migrate;
use super::statedir::SnapshotStore;
use super::transition::{self, Fleet, TransitionFlags, TransitionStatus};
use super::{distribute, locking, profiles};
use super::{Manifest, Result, Sections, TargetRegistry};

/// Everything the deploy pipeline needs besides the manifest itself
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub interface: String,
    pub target_property: String,
    pub profile: String,
    pub coordinator_profile_dir: PathBuf,
    pub old_manifest: Option<String>,
    pub max_concurrent_transfers: usize,
    pub transfer_only: bool,
    pub flags: TransitionFlags,
}

fn profile_arg(profile: &str) -> String {
    if profile == "default" {
        String::new()
    } else {
        format!(" -p {}", profile)
    }
}

fn coordinator_arg(opts: &DeployOptions) -> String {
    format!(" --coordinator-profile-path {}", opts.coordinator_profile_dir.display())
}

fn print_state_notification(opts: &DeployOptions, old_manifest_file: &Path) {
    eprintln!(
        "\nNOTE: Deleting state has been disabled! This means that the state of the\n\
         services that have been moved from one machine to another were copied, but not\n\
         deleted from their previous locations!\n\n\
         To actually remove the old obsolete state, run the following command:\n"
    );
    eprintln!(
        "$ disnix-delete-state{}{} {}\n",
        profile_arg(&opts.profile),
        coordinator_arg(opts),
        old_manifest_file.display()
    );
}

fn print_deploy_fail_message() {
    eprintln!("The deployment failed! Please inspect the output to diagnose any problems!");
}

fn print_deploy_state_fail_message(opts: &DeployOptions, old_manifest_file: Option<&Path>, new_manifest: &Path) {
    eprintln!(
        "\nThe problem is a data migration issue and must be manually diagnosed. To\n\
         attempt migrating the data again, run:\n"
    );

    let mut migrate_cmd = format!("$ disnix-migrate{}{}", profile_arg(&opts.profile), coordinator_arg(opts));
    if opts.flags.no_upgrade {
        migrate_cmd.push_str(" --no-upgrade");
    }
    if opts.flags.delete_state {
        migrate_cmd.push_str(" --delete-state");
    }
    if let Some(old) = old_manifest_file {
        migrate_cmd.push_str(&format!(" -o {}", old.display()));
    }
    eprintln!("{} {}\n", migrate_cmd, new_manifest.display());

    eprintln!(
        "If all problems have been resolved, the deployment must be finalized. To\n\
         accomplish this, run:\n"
    );
    eprintln!(
        "$ disnix-set{}{} {}\n",
        profile_arg(&opts.profile),
        coordinator_arg(opts),
        new_manifest.display()
    );
}

/// Open the previous configuration, if there is one.
///
/// A vanished file is only tolerated when the coordinator profile pointed at
/// it implicitly; an explicitly named old manifest must open.
fn open_previous(opts: &DeployOptions, sections: Sections) -> Result<(Option<PathBuf>, Option<Manifest>)> {
    let old_file = profiles::determine_manifest_to_open(
        opts.old_manifest.as_ref().map(|s| s.as_str()),
        &opts.coordinator_profile_dir,
        &opts.profile,
    );
    match old_file {
        None => Ok((None, None)),
        Some(path) => {
            let manifest = Manifest::load(&path, sections)?;
            Ok((Some(path), Some(manifest)))
        }
    }
}

/// Run the full deploy pipeline for one manifest.
///
/// Returns the process exit code: 0 on success, 2 when a manifest is
/// rejected at the door, 1 for everything that failed beyond that point.
pub fn deploy(new_manifest_file: &Path, opts: &DeployOptions) -> Result<i32> {
    with_configurations(new_manifest_file, opts, |manifest, previous, old_file, registry, fleet, statedir| {
        if opts.flags.dry_run {
            transition::run(manifest, previous, fleet, &opts.flags, statedir, &Interrupt::new())?;
            return Ok(0);
        }

        let interrupt = Interrupt::arm();
        let code = drive(new_manifest_file, manifest, previous, old_file, registry, fleet, statedir, opts, &interrupt)?;
        interrupt.disarm();
        Ok(code)
    })
}

fn drive(
    new_manifest_file: &Path,
    manifest: &Manifest,
    previous: Option<&Manifest>,
    old_manifest_file: Option<&Path>,
    registry: &TargetRegistry,
    fleet: &Fleet,
    statedir: &SnapshotStore,
    opts: &DeployOptions,
    interrupt: &Interrupt,
) -> Result<i32> {
    println!("[coordinator]: Distributing intra-dependency closures...");
    let mut outcome = distribute::distribute(manifest, registry, &opts.profile, opts.max_concurrent_transfers, interrupt)?;
    if outcome == Outcome::Failed {
        // the stage is idempotent: paths already received are skipped
        eprintln!("[coordinator]: Distribution failed, retrying the stage once...");
        outcome = distribute::distribute(manifest, registry, &opts.profile, opts.max_concurrent_transfers, interrupt)?;
    }
    if !outcome.succeeded() {
        print_deploy_fail_message();
        return Ok(1);
    }

    println!("[coordinator]: Acquiring locks...");
    if !locking::lock(manifest, registry, &opts.profile, interrupt)?.succeeded() {
        print_deploy_fail_message();
        return Ok(1);
    }

    let result = if opts.transfer_only {
        let status = migrate::migrate_system(manifest, previous, fleet, &opts.flags, statedir, interrupt)?;
        transition::TransitionResult { status, migrated: 0 }
    } else {
        match transition::run(manifest, previous, fleet, &opts.flags, statedir, interrupt) {
            Ok(r) => r,
            Err(e) => {
                // an orchestration error, not a remote failure: release the
                // locks before giving up
                locking::unlock(manifest, registry, &opts.profile)?;
                return Err(e);
            }
        }
    };

    println!("[coordinator]: Releasing locks...");
    if locking::unlock(manifest, registry, &opts.profile)? != Outcome::Completed {
        eprintln!("[coordinator]: Could not release all locks, they will be force-released on the next deploy");
    }

    match result.status {
        TransitionStatus::Succeeded => {
            if opts.transfer_only {
                return Ok(0);
            }
            println!("[coordinator]: Setting profiles...");
            if !profiles::set_target_profiles(manifest, registry, &opts.profile, interrupt)?.succeeded() {
                print_deploy_fail_message();
                return Ok(1);
            }
            profiles::set_coordinator_profile(&opts.coordinator_profile_dir, &opts.profile, new_manifest_file)?;

            if !opts.flags.delete_state && result.migrated > 0 {
                if let Some(old) = old_manifest_file {
                    print_state_notification(opts, old);
                }
            }
            println!("[coordinator]: The deployment is complete");
            Ok(0)
        }
        TransitionStatus::Failed => {
            print_deploy_fail_message();
            Ok(1)
        }
        TransitionStatus::StateFailed => {
            print_deploy_state_fail_message(opts, old_manifest_file, new_manifest_file);
            Ok(1)
        }
    }
}

/// The `disnix-activate` pipeline: run the transition against an already
/// distributed configuration, without locking or profile bookkeeping.
pub fn activate(new_manifest_file: &Path, opts: &DeployOptions) -> Result<i32> {
    with_configurations(new_manifest_file, opts, |manifest, previous, old_file, _registry, fleet, statedir| {
        let interrupt = Interrupt::arm();
        let result = transition::run(manifest, previous, fleet, &opts.flags, statedir, &interrupt)?;
        interrupt.disarm();

        match result.status {
            TransitionStatus::Succeeded => Ok(0),
            TransitionStatus::Failed => {
                print_deploy_fail_message();
                Ok(1)
            }
            TransitionStatus::StateFailed => {
                print_deploy_state_fail_message(opts, old_file, new_manifest_file);
                Ok(1)
            }
        }
    })
}

/// The `disnix-migrate` pipeline: state movement only.
pub fn migrate_only(new_manifest_file: &Path, opts: &DeployOptions) -> Result<i32> {
    with_configurations(new_manifest_file, opts, |manifest, previous, old_file, _registry, fleet, statedir| {
        let interrupt = Interrupt::arm();
        let status = migrate::migrate_system(manifest, previous, fleet, &opts.flags, statedir, &interrupt)?;
        interrupt.disarm();

        match status {
            TransitionStatus::Succeeded => Ok(0),
            TransitionStatus::Failed => {
                print_deploy_fail_message();
                Ok(1)
            }
            TransitionStatus::StateFailed => {
                print_deploy_state_fail_message(opts, old_file, new_manifest_file);
                Ok(1)
            }
        }
    })
}

/// The `disnix-set` pipeline: pin an already transitioned configuration.
///
/// This is the finalizer named by the `DEPLOY_STATE_FAIL` recovery hint; it
/// is also what heals a deployment that crashed between the target profile
/// sets and the coordinator generation switch.
pub fn finalize(new_manifest_file: &Path, opts: &DeployOptions) -> Result<i32> {
    with_configurations(new_manifest_file, opts, |manifest, _previous, _old_file, registry, _fleet, _statedir| {
        let interrupt = Interrupt::arm();
        let outcome = profiles::set_target_profiles(manifest, registry, &opts.profile, &interrupt)?;
        interrupt.disarm();
        if !outcome.succeeded() {
            print_deploy_fail_message();
            return Ok(1);
        }
        profiles::set_coordinator_profile(&opts.coordinator_profile_dir, &opts.profile, new_manifest_file)?;
        Ok(0)
    })
}

/// The `disnix-compare-manifest` pipeline.
///
/// Exit code 0 when the configurations deploy identically, 1 when they
/// differ or no previous configuration exists, 2 on invalid input.
pub fn compare(new_manifest_file: &Path, opts: &DeployOptions) -> Result<i32> {
    let manifest = match Manifest::load(new_manifest_file, Sections::all()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };
    let (_, previous) = match open_previous(opts, Sections::all()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };
    match previous {
        None => Ok(1),
        Some(prev) => Ok(if manifest.equivalent(&prev) { 0 } else { 1 }),
    }
}

/// The common front matter of the secondary pipelines: open both
/// configurations, resolve the fleet, and hand everything to `body`.
fn with_configurations<F>(new_manifest_file: &Path, opts: &DeployOptions, body: F) -> Result<i32>
where
    F: FnOnce(&Manifest, Option<&Manifest>, Option<&Path>, &TargetRegistry, &Fleet, &SnapshotStore) -> Result<i32>,
{
    let manifest = match Manifest::load(new_manifest_file, Sections::all()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };
    let registry = match TargetRegistry::build(&manifest.infrastructure.target, &opts.interface, &opts.target_property) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };
    let (old_manifest_file, previous) = match open_previous(opts, Sections::all()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };
    let previous_registry = match previous.as_ref() {
        Some(prev) => Some(TargetRegistry::build(
            &prev.infrastructure.target,
            &opts.interface,
            &opts.target_property,
        )?),
        None => None,
    };
    let fleet = Fleet {
        new: &registry,
        previous: previous_registry.as_ref(),
    };
    let statedir = SnapshotStore::from_env();

    body(
        &manifest,
        previous.as_ref(),
        old_manifest_file.as_ref().map(|p| p.as_path()),
        &registry,
        &fleet,
        &statedir,
    )
}
