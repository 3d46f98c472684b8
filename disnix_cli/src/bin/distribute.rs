#[macro_use]
extern crate clap;
extern crate disnix;
extern crate loggerv;

use clap::{App, Arg};
use std::path::Path;
use std::process;

use disnix::interrupt::Interrupt;
use disnix::{defaults, distribute, Manifest, Sections, TargetRegistry};

fn run(args: &clap::ArgMatches) -> disnix::Result<i32> {
    let interface = defaults::client_interface(args.value_of("interface"));
    let target_property = defaults::target_property(args.value_of("target-property"));
    let profile = defaults::profile(args.value_of("profile"));
    let max_concurrent_transfers = value_t!(args, "max-concurrent-transfers", usize).unwrap_or(2);

    let manifest = match Manifest::load(
        Path::new(args.value_of("MANIFEST").unwrap()),
        Sections::distribution_only(),
    ) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[coordinator]: {}", e);
            return Ok(2);
        }
    };
    let registry = TargetRegistry::build(&manifest.infrastructure.target, &interface, &target_property)?;

    let interrupt = Interrupt::arm();
    let outcome = distribute::distribute(&manifest, &registry, &profile, max_concurrent_transfers, &interrupt)?;
    interrupt.disarm();

    Ok(if outcome.succeeded() { 0 } else { 1 })
}

fn main() {
    let args = App::new("disnix-distribute")
        .version(crate_version!())
        .about("Distributes intra-dependency closures of per-target profiles")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(Arg::with_name("profile").short("p").long("profile").takes_value(true))
        .arg(
            Arg::with_name("max-concurrent-transfers")
                .short("m")
                .long("max-concurrent-transfers")
                .takes_value(true)
                .help("Maximum number of concurrent closure transfers"),
        )
        .arg(Arg::with_name("interface").long("interface").takes_value(true))
        .arg(Arg::with_name("target-property").long("target-property").takes_value(true))
        .arg(Arg::with_name("MANIFEST").required(true).help("Manifest describing the configuration"))
        .get_matches();

    loggerv::init_with_verbosity(args.occurrences_of("verbose")).unwrap();

    let code = run(&args).unwrap_or_else(|e| {
        eprintln!("[coordinator]: {}", e);
        1
    });
    process::exit(code);
}
