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
    let args = App::new("disnix-compare-manifest")
        .version(crate_version!())
        .about("Compares a manifest against the last deployed configuration")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(
            Arg::with_name("old-manifest")
                .short("o")
                .long("old-manifest")
                .takes_value(true)
                .help("Manifest to compare against instead of the deployed one"),
        )
        .arg(Arg::with_name("profile").short("p").long("profile").takes_value(true))
        .arg(Arg::with_name("coordinator-profile-path").long("coordinator-profile-path").takes_value(true))
        .arg(Arg::with_name("MANIFEST").required(true).help("Manifest describing the new configuration"))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let opts = DeployOptions {
        interface: defaults::client_interface(None),
        target_property: defaults::target_property(None),
        profile: defaults::profile(args.value_of("profile")),
        coordinator_profile_dir: defaults::coordinator_profile_dir(args.value_of("coordinator-profile-path")),
        old_manifest: args.value_of("old-manifest").map(String::from),
        max_concurrent_transfers: 2,
        transfer_only: false,
        flags: TransitionFlags::default(),
    };

    let manifest = args.value_of("MANIFEST").unwrap();
    let code = deploy::compare(Path::new(manifest), &opts).unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        2
    });
    process::exit(code);
}
