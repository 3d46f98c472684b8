#[macro_use]
extern crate clap;
extern crate disnix;
extern crate loggerv;

use clap::{App, Arg};
use std::process;

use disnix::client::RemoteClient;
use disnix::statedir::SnapshotStore;
use disnix::{copy, defaults};

fn run(args: &clap::ArgMatches) -> disnix::Result<i32> {
    let interface = defaults::client_interface(args.value_of("interface"));
    let target = args.value_of("target").unwrap();
    let container = args.value_of("container").unwrap();
    let component = args.value_of("component").unwrap();
    let all = args.is_present("all");

    let client = RemoteClient::new(&interface, target);
    let statedir = SnapshotStore::from_env();

    if args.is_present("from") {
        copy::copy_snapshots_from(&client, &statedir, container, component, all)?;
    } else {
        copy::copy_snapshots_to(&client, &statedir, container, component, all)?;
    }
    Ok(0)
}

fn main() {
    let args = App::new("disnix-copy-snapshots")
        .version(crate_version!())
        .about("Transfers the snapshot generations of a component to or from a target")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(Arg::with_name("to").long("to").help("Copy snapshots to the target"))
        .arg(
            Arg::with_name("from")
                .long("from")
                .conflicts_with("to")
                .help("Copy snapshots from the target"),
        )
        .arg(
            Arg::with_name("target")
                .short("t")
                .long("target")
                .takes_value(true)
                .required(true)
                .help("Address of the remote agent"),
        )
        .arg(
            Arg::with_name("container")
                .short("c")
                .long("container")
                .takes_value(true)
                .required(true)
                .help("Container in which the component is deployed"),
        )
        .arg(
            Arg::with_name("component")
                .short("C")
                .long("component")
                .takes_value(true)
                .required(true)
                .help("Component to transfer snapshots of"),
        )
        .arg(Arg::with_name("all").long("all").help("Transfer all generations instead of the latest only"))
        .arg(Arg::with_name("interface").long("interface").takes_value(true))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let code = run(&args).unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        1
    });
    process::exit(code);
}
