#[macro_use]
extern crate clap;
extern crate disnix;
extern crate loggerv;

use clap::{App, Arg};
use std::process;

use disnix::interrupt::Interrupt;
use disnix::transition::Fleet;
use disnix::{defaults, delete_state, profiles, Manifest, Sections, TargetRegistry};

fn run(args: &clap::ArgMatches) -> disnix::Result<i32> {
    let interface = defaults::client_interface(args.value_of("interface"));
    let target_property = defaults::target_property(args.value_of("target-property"));
    let profile = defaults::profile(args.value_of("profile"));
    let coordinator_dir = defaults::coordinator_profile_dir(args.value_of("coordinator-profile-path"));

    // the manifest whose obsolete state is swept; the deployed one by default
    let old = match args
        .value_of("MANIFEST")
        .map(std::path::PathBuf::from)
        .or_else(|| profiles::determine_manifest_to_open(None, &coordinator_dir, &profile))
    {
        Some(f) => f,
        None => {
            eprintln!("[coordinator]: Cannot open any manifest file!");
            return Ok(1);
        }
    };
    let old_manifest = match Manifest::load(&old, Sections::all()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };

    // the currently deployed manifest decides what still counts as live
    let current = profiles::determine_manifest_to_open(None, &coordinator_dir, &profile)
        .filter(|p| p != &old)
        .map(|p| Manifest::load(&p, Sections::all()))
        .transpose()?;

    let registry = TargetRegistry::build(&old_manifest.infrastructure.target, &interface, &target_property)?;
    let current_registry = match current.as_ref() {
        Some(c) => Some(TargetRegistry::build(&c.infrastructure.target, &interface, &target_property)?),
        None => None,
    };
    let fleet = Fleet {
        new: current_registry.as_ref().unwrap_or(&registry),
        previous: Some(&registry),
    };

    let interrupt = Interrupt::arm();
    let outcome = delete_state::delete_obsolete_state(
        &old_manifest,
        current.as_ref(),
        &fleet,
        args.value_of("container"),
        args.value_of("component"),
        &interrupt,
    )?;
    interrupt.disarm();

    Ok(if outcome.succeeded() { 0 } else { 1 })
}

fn main() {
    let args = App::new("disnix-delete-state")
        .version(crate_version!())
        .about("Removes the state of services that are no longer deployed")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(
            Arg::with_name("container")
                .short("c")
                .long("container")
                .takes_value(true)
                .help("Only delete state of components in this container"),
        )
        .arg(
            Arg::with_name("component")
                .short("C")
                .long("component")
                .takes_value(true)
                .help("Only delete state of this component"),
        )
        .arg(Arg::with_name("profile").short("p").long("profile").takes_value(true))
        .arg(Arg::with_name("coordinator-profile-path").long("coordinator-profile-path").takes_value(true))
        .arg(Arg::with_name("interface").long("interface").takes_value(true))
        .arg(Arg::with_name("target-property").long("target-property").takes_value(true))
        .arg(Arg::with_name("MANIFEST").help("Manifest whose obsolete state is removed"))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let code = run(&args).unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        1
    });
    process::exit(code);
}
