#[macro_use]
extern crate clap;
extern crate disnix;
extern crate loggerv;

use clap::{App, Arg};
use std::path::Path;
use std::process;

use disnix::defaults;
use disnix::deploy::{self, DeployOptions};
use disnix::transition::TransitionFlags;

fn main() {
    let args = App::new("disnix-env")
        .version(crate_version!())
        .about("Installs or upgrades the services of a distributed system")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(
            Arg::with_name("old-manifest")
                .short("o")
                .long("old-manifest")
                .takes_value(true)
                .help("Manifest of the previously deployed configuration"),
        )
        .arg(
            Arg::with_name("profile")
                .short("p")
                .long("profile")
                .takes_value(true)
                .help("Profile in which the services are registered"),
        )
        .arg(
            Arg::with_name("coordinator-profile-path")
                .long("coordinator-profile-path")
                .takes_value(true)
                .help("Directory holding the coordinator profile generations"),
        )
        .arg(
            Arg::with_name("max-concurrent-transfers")
                .short("m")
                .long("max-concurrent-transfers")
                .takes_value(true)
                .help("Maximum number of concurrent closure and snapshot transfers"),
        )
        .arg(
            Arg::with_name("interface")
                .long("interface")
                .takes_value(true)
                .help("Client interface executable"),
        )
        .arg(
            Arg::with_name("target-property")
                .long("target-property")
                .takes_value(true)
                .help("Target property supplying the connection address"),
        )
        .arg(Arg::with_name("no-upgrade").long("no-upgrade").help("Ignore the previous configuration"))
        .arg(Arg::with_name("no-migration").long("no-migration").help("Do not migrate state of moved services"))
        .arg(Arg::with_name("no-rollback").long("no-rollback").help("Never roll back automatically on failure"))
        .arg(Arg::with_name("delete-state").long("delete-state").help("Delete obsolete state after migration"))
        .arg(Arg::with_name("transfer-only").long("transfer-only").help("Distribute and copy state, do not activate"))
        .arg(Arg::with_name("depth-first").long("depth-first").help("Interleave the transition per service"))
        .arg(Arg::with_name("dry-run").long("dry-run").help("Print the transition plan and do nothing"))
        .arg(Arg::with_name("MANIFEST").required(true).help("Manifest describing the new configuration"))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let flags = TransitionFlags {
        no_upgrade: args.is_present("no-upgrade"),
        no_migration: args.is_present("no-migration"),
        no_rollback: args.is_present("no-rollback"),
        delete_state: defaults::delete_state(args.is_present("delete-state")),
        dry_run: args.is_present("dry-run"),
        depth_first: args.is_present("depth-first"),
    };
    let opts = DeployOptions {
        interface: defaults::client_interface(args.value_of("interface")),
        target_property: defaults::target_property(args.value_of("target-property")),
        profile: defaults::profile(args.value_of("profile")),
        coordinator_profile_dir: defaults::coordinator_profile_dir(args.value_of("coordinator-profile-path")),
        old_manifest: args.value_of("old-manifest").map(String::from),
        max_concurrent_transfers: value_t!(args, "max-concurrent-transfers", usize).unwrap_or(2),
        transfer_only: args.is_present("transfer-only"),
        flags,
    };

    let manifest = args.value_of("MANIFEST").unwrap();
    let code = deploy::deploy(Path::new(manifest), &opts).unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        1
    });
    process::exit(code);
}
