#[macro_use]
extern crate clap;
extern crate disnix;
extern crate loggerv;

use clap::{App, Arg};
use std::path::Path;
use std::process;

use disnix::interrupt::Interrupt;
use disnix::{clean_snapshots, defaults, Infrastructure, TargetRegistry};

fn run(args: &clap::ArgMatches) -> disnix::Result<i32> {
    let interface = defaults::client_interface(args.value_of("interface"));
    let target_property = defaults::target_property(args.value_of("target-property"));
    let keep = value_t!(args, "keep", u32).unwrap_or(1);

    let infra = match Infrastructure::load(Path::new(args.value_of("INFRASTRUCTURE").unwrap())) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };
    let registry = TargetRegistry::build(&infra.target, &interface, &target_property)?;

    let interrupt = Interrupt::arm();
    let outcome = clean_snapshots::clean_snapshots(
        &registry,
        keep,
        args.value_of("container"),
        args.value_of("component"),
        &interrupt,
    )?;
    interrupt.disarm();

    Ok(if outcome.succeeded() { 0 } else { 1 })
}

fn main() {
    let args = App::new("disnix-clean-snapshots")
        .version(crate_version!())
        .about("Prunes old snapshot generations on every target of a fleet")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(
            Arg::with_name("keep")
                .long("keep")
                .takes_value(true)
                .help("Number of generations to keep per component"),
        )
        .arg(
            Arg::with_name("container")
                .short("c")
                .long("container")
                .takes_value(true)
                .help("Only clean components in this container"),
        )
        .arg(
            Arg::with_name("component")
                .short("C")
                .long("component")
                .takes_value(true)
                .help("Only clean this component"),
        )
        .arg(Arg::with_name("interface").long("interface").takes_value(true))
        .arg(Arg::with_name("target-property").long("target-property").takes_value(true))
        .arg(Arg::with_name("INFRASTRUCTURE").required(true).help("Infrastructure model describing the fleet"))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let code = run(&args).unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        1
    });
    process::exit(code);
}
