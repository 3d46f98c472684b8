#[macro_use]
extern crate clap;
extern crate disnix;
extern crate loggerv;

use clap::{App, Arg};
use std::process;

use disnix::client::RemoteClient;
use disnix::{copy, defaults};

fn run(args: &clap::ArgMatches) -> disnix::Result<i32> {
    let interface = defaults::client_interface(args.value_of("interface"));
    let target = args.value_of("target").unwrap();
    let paths: Vec<String> = args.values_of("PATHS").unwrap().map(String::from).collect();

    let client = RemoteClient::new(&interface, target);
    if args.is_present("from") {
        copy::copy_closure_from(&client, &paths)?;
    } else {
        copy::copy_closure_to(&client, &paths)?;
    }
    Ok(0)
}

fn main() {
    let args = App::new("disnix-copy-closure")
        .version(crate_version!())
        .about("Copies the intra-dependency closure of store paths to or from a target")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(Arg::with_name("to").long("to").help("Copy the closure to the target"))
        .arg(
            Arg::with_name("from")
                .long("from")
                .conflicts_with("to")
                .help("Copy the closure from the target"),
        )
        .arg(
            Arg::with_name("target")
                .short("t")
                .long("target")
                .takes_value(true)
                .required(true)
                .help("Address of the remote agent"),
        )
        .arg(Arg::with_name("interface").long("interface").takes_value(true))
        .arg(Arg::with_name("PATHS").required(true).multiple(true).help("Store paths to copy"))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let code = run(&args).unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        1
    });
    process::exit(code);
}
