#[macro_use]
extern crate clap;
extern crate disnix;
extern crate loggerv;

use clap::{App, Arg};
use std::process;

use disnix::{defaults, locking};

fn main() {
    let args = App::new("disnix-lock")
        .version(crate_version!())
        .about("Acquires or releases the deployment locks of a fleet")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(Arg::with_name("unlock").short("u").long("unlock").help("Release the locks instead of acquiring them"))
        .arg(Arg::with_name("profile").short("p").long("profile").takes_value(true))
        .arg(Arg::with_name("coordinator-profile-path").long("coordinator-profile-path").takes_value(true))
        .arg(Arg::with_name("interface").long("interface").takes_value(true))
        .arg(Arg::with_name("target-property").long("target-property").takes_value(true))
        .arg(Arg::with_name("MANIFEST").help("Manifest describing the fleet; the last deployed one when omitted"))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let code = locking::lock_or_unlock(
        !args.is_present("unlock"),
        args.value_of("MANIFEST"),
        &defaults::coordinator_profile_dir(args.value_of("coordinator-profile-path")),
        &defaults::profile(args.value_of("profile")),
        &defaults::client_interface(args.value_of("interface")),
        &defaults::target_property(args.value_of("target-property")),
    )
    .unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        1
    });
    process::exit(code);
}
