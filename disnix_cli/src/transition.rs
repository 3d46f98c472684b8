use std::collections::{BTreeMap, HashSet};

use super::client::RemoteClient;
use super::executor::{self, Outcome};
use super::interrupt::Interrupt;
use super::migrate;
use super::statedir::SnapshotStore;
use super::{Manifest, Result, ServiceGraph, ServiceMapping, TargetRegistry};

// New failure error type
#[derive(Debug)]
struct TError {
    inner: Context<TErrKind>,
}
// its associated enum
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
enum TErrKind {
    #[fail(display = "Deactivation of service '{}' on target '{}' failed", _0, _1)]
    DeactivationFailure(String, String),

    #[fail(display = "Activation of service '{}' on target '{}' failed", _0, _1)]
    ActivationFailure(String, String),

    #[fail(display = "State migration of component '{}' failed", _0)]
    MigrationFailure(String),
}
use failure::{Backtrace, Context, Error, Fail};
use std::fmt::{self, Display};

// boilerplate error wrapping (might go away)
impl Fail for TError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }
    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}
impl Display for TError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<TErrKind> for TError {
    fn from(kind: TErrKind) -> TError {
        TError { inner: Context::new(kind) }
    }
}
impl From<Context<TErrKind>> for TError {
    fn from(inner: Context<TErrKind>) -> TError {
        TError { inner }
    }
}

/// Flags steering a transition
#[derive(Debug, Clone, Default)]
pub struct TransitionFlags {
    /// Ignore the previous configuration entirely
    pub no_upgrade: bool,
    /// Skip state migration for moved services
    pub no_migration: bool,
    /// Never run the automatic inverse transition on failure
    pub no_rollback: bool,
    /// Remove obsolete state from old targets after a successful migration
    pub delete_state: bool,
    /// Print the plan and execute nothing remote
    pub dry_run: bool,
    /// Interleave deactivate/migrate/activate per service
    pub depth_first: bool,
}

/// One concrete (de)activation with its catalogue record resolved
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Unit {
    pub service: String,
    pub name: String,
    pub pkg: String,
    pub activation_type: String,
    pub target: String,
    pub container: String,
}

/// A moved stateful service whose snapshots must travel
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Migration {
    pub name: String,
    pub component: String,
    pub container: String,
    pub from: String,
    pub to: String,
    pub old_service: String,
    pub new_service: String,
}

/// The computed difference between two deployment configurations.
///
/// `deactivate` excludes the old instances of migrating services; those sit
/// in `post_deactivate` because they must outlive the activation of their
/// successor. `kept` participates in ordering only.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct Plan {
    pub deactivate: Vec<Unit>,
    pub activate: Vec<Unit>,
    pub post_deactivate: Vec<Unit>,
    pub migrate: Vec<Migration>,
    pub kept: Vec<String>,
}

impl Plan {
    pub fn is_identity(&self) -> bool {
        self.deactivate.is_empty()
            && self.activate.is_empty()
            && self.post_deactivate.is_empty()
            && self.migrate.is_empty()
    }
}

/// Outcome classes of a transition, by recoverability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStatus {
    Succeeded,
    /// Failed before any state moved; the previous configuration was restored
    Failed,
    /// Failed after snapshots started moving; reverting automatically would
    /// overwrite newer state with older, so nothing was reverted
    StateFailed,
}

pub struct TransitionResult {
    pub status: TransitionStatus,
    /// Number of migrations that ran, for the cleanup notification
    pub migrated: usize,
}

fn unit(manifest: &Manifest, mapping: &ServiceMapping) -> Result<Unit> {
    let svc = manifest
        .service(&mapping.service)
        .ok_or_else(|| format_err!("mapping refers to unknown service {}", mapping.service))?;
    Ok(Unit {
        service: svc.key.clone(),
        name: svc.name.clone(),
        pkg: svc.pkg.clone(),
        activation_type: svc.activation_type.clone(),
        target: mapping.target.clone(),
        container: mapping.container.clone(),
    })
}

/// Compute the transition plan between two manifests.
pub fn diff(new: &Manifest, previous: Option<&Manifest>, flags: &TransitionFlags) -> Result<Plan> {
    let previous = if flags.no_upgrade { None } else { previous };

    let new_set: HashSet<&ServiceMapping> = new.serviceMappings.mapping.iter().collect();
    let prev_set: HashSet<&ServiceMapping> = previous
        .map(|p| p.serviceMappings.mapping.iter().collect())
        .unwrap_or_else(HashSet::new);

    let mut activate = Vec::new();
    let mut kept = Vec::new();
    for m in &new.serviceMappings.mapping {
        if prev_set.contains(m) {
            kept.push(m.service.clone());
        } else {
            activate.push(unit(new, m)?);
        }
    }
    kept.sort();
    kept.dedup();

    let mut obsolete = Vec::new();
    if let Some(prev) = previous {
        for m in &prev.serviceMappings.mapping {
            if !new_set.contains(m) {
                obsolete.push(unit(prev, m)?);
            }
        }
    }

    // moved stateful services, matched by service identity rather than key
    let mut migrate = Vec::new();
    if let Some(prev) = previous {
        if !flags.no_migration {
            for sm in &new.snapshotMappings.mapping {
                let svc = new
                    .service(&sm.service)
                    .ok_or_else(|| format_err!("snapshot mapping refers to unknown service {}", sm.service))?;
                let same_tuple = ServiceMapping {
                    service: sm.service.clone(),
                    target: sm.target.clone(),
                    container: sm.container.clone(),
                };
                if prev_set.contains(&same_tuple) {
                    continue;
                }
                let old_svc = match prev.service_by_name(&svc.name) {
                    Some(s) => s,
                    None => continue,
                };
                let old_mapping = prev.serviceMappings.mapping.iter().find(|m| {
                    m.service == old_svc.key && m.container == sm.container && m.target != sm.target
                });
                if let Some(old) = old_mapping {
                    migrate.push(Migration {
                        name: svc.name.clone(),
                        component: sm.component.clone(),
                        container: sm.container.clone(),
                        from: old.target.clone(),
                        to: sm.target.clone(),
                        old_service: old_svc.key.clone(),
                        new_service: svc.key.clone(),
                    });
                }
            }
        }
    }

    // old instances of migrating services must outlive their successors
    let held_back: HashSet<(String, String, String)> = migrate
        .iter()
        .map(|m| (m.old_service.clone(), m.from.clone(), m.container.clone()))
        .collect();
    let (post_deactivate, deactivate): (Vec<Unit>, Vec<Unit>) = obsolete
        .into_iter()
        .partition(|u| held_back.contains(&(u.service.clone(), u.target.clone(), u.container.clone())));

    Ok(Plan {
        deactivate,
        activate,
        post_deactivate,
        migrate,
        kept,
    })
}

/// Resolves targets against the new configuration first, falling back to the
/// previous one for machines that are leaving the fleet.
pub struct Fleet<'a> {
    pub new: &'a TargetRegistry,
    pub previous: Option<&'a TargetRegistry>,
}

impl<'a> Fleet<'a> {
    pub fn resolved(&self, key: &str) -> Result<&disnix_models::ResolvedTarget> {
        if let Some(t) = self.new.get(key) {
            return Ok(t);
        }
        if let Some(prev) = self.previous {
            if let Some(t) = prev.get(key) {
                return Ok(t);
            }
        }
        bail!("unknown target: {}", key)
    }

    pub fn client_for(&self, key: &str) -> Result<RemoteClient> {
        let t = self.resolved(key)?;
        Ok(RemoteClient::new(&t.client_interface, &t.address))
    }
}

/// Assemble the property environment of one (de)activation: the service's
/// own bindings, the container record, and one address binding per
/// inter-dependency.
fn activation_env(u: &Unit, manifest: &Manifest, fleet: &Fleet) -> Result<Vec<(String, String)>> {
    let mut env: BTreeMap<String, String> = BTreeMap::new();

    if let Some(svc) = manifest.service(&u.service) {
        for (k, v) in &svc.properties {
            env.insert(k.clone(), v.clone());
        }
        for dep_key in svc.dependencies() {
            let dep = manifest
                .service(dep_key)
                .ok_or_else(|| format_err!("service {} inter-depends on unknown service {}", u.service, dep_key))?;
            if let Some(m) = manifest.serviceMappings.mapping.iter().find(|m| &m.service == dep_key) {
                let addr = fleet.resolved(&m.target)?.address.clone();
                env.insert(format!("{}_TARGET", dep.name), addr);
                env.insert(format!("{}_CONTAINER", dep.name), m.container.clone());
            }
        }
    }

    if let Some(container) = fleet.resolved(&u.target)?.container(&u.container) {
        for (k, v) in container {
            env.insert(k.clone(), v.clone());
        }
    }

    Ok(env.into_iter().collect())
}

#[derive(Clone, Copy, PartialEq)]
enum Action {
    Activate,
    Deactivate,
}

/// Map plan units onto dependency waves.
///
/// Ordering constraints flow through the kept services, so the waves are
/// computed over the union and then filtered down to what actually runs.
fn unit_waves(manifest: &Manifest, units: &[Unit], kept: &[String], reverse: bool) -> Result<Vec<Vec<Unit>>> {
    let graph = ServiceGraph::build(&manifest.services.service)?;
    let mut keys: HashSet<String> = units.iter().map(|u| u.service.clone()).collect();
    keys.extend(kept.iter().cloned());

    let mut waves = graph.waves(&keys);
    if reverse {
        waves.reverse();
    }

    let mut out = Vec::new();
    for wave in waves {
        let members: HashSet<&String> = wave.iter().collect();
        let selected: Vec<Unit> = units.iter().filter(|u| members.contains(&u.service)).cloned().collect();
        if !selected.is_empty() {
            out.push(selected);
        }
    }
    Ok(out)
}

/// Run one wave of (de)activations through the task engine.
fn run_wave(
    action: Action,
    wave: &[Unit],
    manifest: &Manifest,
    fleet: &Fleet,
    interrupt: &Interrupt,
    done: &mut Vec<Unit>,
) -> Outcome {
    executor::run(
        wave,
        None,
        interrupt,
        |u| u.target.clone(),
        |u| {
            let env = activation_env(u, manifest, fleet)?;
            let client = fleet.client_for(&u.target)?;
            match action {
                Action::Activate => {
                    println!(
                        "[target: {}]: Activating service: {} of type: {} in container: {}",
                        u.target, u.name, u.activation_type, u.container
                    );
                    client.activate(&u.activation_type, &u.container, &u.pkg, &env)
                }
                Action::Deactivate => {
                    println!(
                        "[target: {}]: Deactivating service: {} of type: {} in container: {}",
                        u.target, u.name, u.activation_type, u.container
                    );
                    client.deactivate(&u.activation_type, &u.container, &u.pkg, &env)
                }
            }
        },
        |u, completion| {
            if completion.success {
                done.push(u.clone());
            } else {
                let kind = match action {
                    Action::Activate => TErrKind::ActivationFailure(u.name.clone(), u.target.clone()),
                    Action::Deactivate => TErrKind::DeactivationFailure(u.name.clone(), u.target.clone()),
                };
                eprintln!("[target: {}]: {}", u.target, Error::from(TError::from(kind)));
            }
        },
    )
}

struct Progress {
    activated: Vec<Unit>,
    deactivated: Vec<Unit>,
    state_moved: bool,
    migrated: usize,
}

/// Execute a transition plan.
///
/// On a reversible failure the inverse transition is applied to whatever
/// subset had been reached and `Failed` is returned; once any snapshot has
/// moved, failures are final and reported as `StateFailed` without touching
/// the old instances again.
pub fn run(
    new: &Manifest,
    previous: Option<&Manifest>,
    fleet: &Fleet,
    flags: &TransitionFlags,
    statedir: &SnapshotStore,
    interrupt: &Interrupt,
) -> Result<TransitionResult> {
    let plan = diff(new, previous, flags)?;

    if flags.dry_run {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(TransitionResult {
            status: TransitionStatus::Succeeded,
            migrated: 0,
        });
    }
    if plan.is_identity() {
        println!("[coordinator]: Both configurations are identical, no transition is needed");
        return Ok(TransitionResult {
            status: TransitionStatus::Succeeded,
            migrated: 0,
        });
    }

    let mut progress = Progress {
        activated: Vec::new(),
        deactivated: Vec::new(),
        state_moved: false,
        migrated: 0,
    };

    let status = if flags.depth_first {
        run_depth_first(&plan, new, previous, fleet, flags, statedir, interrupt, &mut progress)
    } else {
        run_breadth_first(&plan, new, previous, fleet, flags, statedir, interrupt, &mut progress)
    };

    match status {
        Ok(()) => Ok(TransitionResult {
            status: TransitionStatus::Succeeded,
            migrated: progress.migrated,
        }),
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            if progress.state_moved {
                Ok(TransitionResult {
                    status: TransitionStatus::StateFailed,
                    migrated: progress.migrated,
                })
            } else {
                if !flags.no_rollback {
                    rollback(new, previous, fleet, interrupt, &progress);
                }
                Ok(TransitionResult {
                    status: TransitionStatus::Failed,
                    migrated: progress.migrated,
                })
            }
        }
    }
}

fn require(outcome: Outcome, failure: TErrKind) -> Result<()> {
    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Interrupted => bail!("the transition has been interrupted"),
        Outcome::Failed => Err(Error::from(TError::from(failure))),
    }
}

fn run_breadth_first(
    plan: &Plan,
    new: &Manifest,
    previous: Option<&Manifest>,
    fleet: &Fleet,
    flags: &TransitionFlags,
    statedir: &SnapshotStore,
    interrupt: &Interrupt,
    progress: &mut Progress,
) -> Result<()> {
    // obsolete services go first, dependents before their dependencies
    if let Some(prev) = previous {
        for wave in unit_waves(prev, &plan.deactivate, &plan.kept, true)? {
            let outcome = run_wave(Action::Deactivate, &wave, prev, fleet, interrupt, &mut progress.deactivated);
            require(outcome, TErrKind::DeactivationFailure(wave[0].name.clone(), wave[0].target.clone()))?;
        }
    }

    run_migrations(plan, fleet, statedir, interrupt, progress)?;

    // bring up the new configuration, dependencies first
    for wave in unit_waves(new, &plan.activate, &plan.kept, false)? {
        let outcome = run_wave(Action::Activate, &wave, new, fleet, interrupt, &mut progress.activated);
        require(outcome, TErrKind::ActivationFailure(wave[0].name.clone(), wave[0].target.clone()))?;
    }

    // only now are the old instances of moved services taken down
    if let Some(prev) = previous {
        for wave in unit_waves(prev, &plan.post_deactivate, &plan.kept, true)? {
            let outcome = run_wave(Action::Deactivate, &wave, prev, fleet, interrupt, &mut progress.deactivated);
            require(outcome, TErrKind::DeactivationFailure(wave[0].name.clone(), wave[0].target.clone()))?;
        }
    }

    delete_obsolete_state(plan, fleet, flags)?;
    Ok(())
}

fn run_depth_first(
    plan: &Plan,
    new: &Manifest,
    previous: Option<&Manifest>,
    fleet: &Fleet,
    flags: &TransitionFlags,
    statedir: &SnapshotStore,
    interrupt: &Interrupt,
    progress: &mut Progress,
) -> Result<()> {
    // services leaving the fleet entirely are taken down up front
    let new_names: HashSet<&str> = new.services.service.iter().map(|s| s.name.as_str()).collect();
    let (removals, upgrades): (Vec<Unit>, Vec<Unit>) = plan
        .deactivate
        .iter()
        .chain(plan.post_deactivate.iter())
        .cloned()
        .partition(|u| !new_names.contains(u.name.as_str()));

    if let Some(prev) = previous {
        for wave in unit_waves(prev, &removals, &plan.kept, true)? {
            let outcome = run_wave(Action::Deactivate, &wave, prev, fleet, interrupt, &mut progress.deactivated);
            require(outcome, TErrKind::DeactivationFailure(wave[0].name.clone(), wave[0].target.clone()))?;
        }
    }

    // one service at a time: deactivate the old instance, migrate its
    // state, activate the new instance
    for wave in unit_waves(new, &plan.activate, &plan.kept, false)? {
        for u in &wave {
            if interrupt.is_set() {
                bail!("the transition has been interrupted");
            }

            let old_units: Vec<Unit> = upgrades.iter().filter(|o| o.name == u.name).cloned().collect();
            if let Some(prev) = previous {
                let outcome = run_wave(Action::Deactivate, &old_units, prev, fleet, interrupt, &mut progress.deactivated);
                require(outcome, TErrKind::DeactivationFailure(u.name.clone(), u.target.clone()))?;
            }

            if let Some(m) = plan.migrate.iter().find(|m| m.new_service == u.service && m.to == u.target) {
                migrate_one(m, fleet, statedir, progress)?;
            }

            let single = vec![u.clone()];
            let outcome = run_wave(Action::Activate, &single, new, fleet, interrupt, &mut progress.activated);
            require(outcome, TErrKind::ActivationFailure(u.name.clone(), u.target.clone()))?;
        }
    }

    delete_obsolete_state(plan, fleet, flags)?;
    Ok(())
}

fn migrate_one(m: &Migration, fleet: &Fleet, statedir: &SnapshotStore, progress: &mut Progress) -> Result<()> {
    let old_client = fleet.client_for(&m.from)?;
    let new_client = fleet.client_for(&m.to)?;
    migrate::migrate_component(m, &old_client, &new_client, statedir, &mut progress.state_moved)
        .map_err(|e| Error::from(e.context(TErrKind::MigrationFailure(m.component.clone()))))?;
    progress.migrated += 1;
    Ok(())
}

fn run_migrations(
    plan: &Plan,
    fleet: &Fleet,
    statedir: &SnapshotStore,
    interrupt: &Interrupt,
    progress: &mut Progress,
) -> Result<()> {
    for m in &plan.migrate {
        if interrupt.is_set() {
            bail!("the transition has been interrupted");
        }
        migrate_one(m, fleet, statedir, progress)?;
    }
    Ok(())
}

fn delete_obsolete_state(plan: &Plan, fleet: &Fleet, flags: &TransitionFlags) -> Result<()> {
    if !flags.delete_state {
        return Ok(());
    }
    for m in &plan.migrate {
        println!(
            "[target: {}]: Deleting obsolete state of component: {} in container: {}",
            m.from, m.component, m.container
        );
        let client = fleet.client_for(&m.from)?;
        let ok = super::client::wait_to_finish(client.delete_state(&m.container, &m.component)?)?;
        if !ok {
            // the data is already safe on the new target, so this is a
            // cleanup problem rather than a deployment problem
            eprintln!(
                "[target: {}]: Cannot delete obsolete state of component: {}",
                m.from, m.component
            );
        }
    }
    Ok(())
}

/// Best-effort inverse transition after a reversible failure.
fn rollback(new: &Manifest, previous: Option<&Manifest>, fleet: &Fleet, _interrupt: &Interrupt, progress: &Progress) {
    eprintln!("[coordinator]: The transition failed, attempting to roll back...");

    // the bail-out must run even when the failure was an interruption
    let token = Interrupt::new();
    let mut undone = Vec::new();

    if !progress.activated.is_empty() {
        match unit_waves(new, &progress.activated, &[], true) {
            Ok(waves) => {
                for wave in waves {
                    let outcome = run_wave(Action::Deactivate, &wave, new, fleet, &token, &mut undone);
                    if !outcome.succeeded() {
                        eprintln!("[coordinator]: Rollback deactivation failed, please inspect the fleet manually");
                    }
                }
            }
            Err(e) => eprintln!("[coordinator]: Cannot order rollback deactivations: {}", e),
        }
    }

    if let (Some(prev), false) = (previous, progress.deactivated.is_empty()) {
        match unit_waves(prev, &progress.deactivated, &[], false) {
            Ok(waves) => {
                for wave in waves {
                    let outcome = run_wave(Action::Activate, &wave, prev, fleet, &token, &mut undone);
                    if !outcome.succeeded() {
                        eprintln!("[coordinator]: Rollback activation failed, please inspect the fleet manually");
                    }
                }
            }
            Err(e) => eprintln!("[coordinator]: Cannot order rollback activations: {}", e),
        }
    }
}
