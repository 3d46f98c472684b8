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
    let args = App::new("disnix-migrate")
        .version(crate_version!())
        .about("Migrates the state of moved services between targets")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(
            Arg::with_name("old-manifest")
                .short("o")
                .long("old-manifest")
                .takes_value(true)
                .help("Manifest of the previously deployed configuration"),
        )
        .arg(Arg::with_name("profile").short("p").long("profile").takes_value(true))
        .arg(Arg::with_name("coordinator-profile-path").long("coordinator-profile-path").takes_value(true))
        .arg(Arg::with_name("interface").long("interface").takes_value(true))
        .arg(Arg::with_name("target-property").long("target-property").takes_value(true))
        .arg(Arg::with_name("no-upgrade").long("no-upgrade").help("Ignore the previous configuration"))
        .arg(Arg::with_name("delete-state").long("delete-state").help("Delete obsolete state after migration"))
        .arg(Arg::with_name("MANIFEST").required(true).help("Manifest describing the new configuration"))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let flags = TransitionFlags {
        no_upgrade: args.is_present("no-upgrade"),
        no_migration: false,
        no_rollback: false,
        delete_state: defaults::delete_state(args.is_present("delete-state")),
        dry_run: false,
        depth_first: false,
    };
    let opts = DeployOptions {
        interface: defaults::client_interface(args.value_of("interface")),
        target_property: defaults::target_property(args.value_of("target-property")),
        profile: defaults::profile(args.value_of("profile")),
        coordinator_profile_dir: defaults::coordinator_profile_dir(args.value_of("coordinator-profile-path")),
        old_manifest: args.value_of("old-manifest").map(String::from),
        max_concurrent_transfers: 2,
        transfer_only: false,
        flags,
    };

    let manifest = args.value_of("MANIFEST").unwrap();
    let code = deploy::migrate_only(Path::new(manifest), &opts).unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        1
    });
    process::exit(code);
}
