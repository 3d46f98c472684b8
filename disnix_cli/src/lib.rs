#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]

extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

extern crate libc;
extern crate regex;

// parallel fleet operations:
extern crate threadpool;

#[macro_use]
extern crate log;

#[macro_use] extern crate failure;

pub use failure::Error; //Fail
pub type Result<T> = std::result::Result<T, Error>;

extern crate disnix_models;
pub use disnix_models::structs::{DistributionMapping, Service, ServiceMapping, SnapshotMapping};
pub use disnix_models::{Infrastructure, Manifest, ResolvedTarget, Sections, ServiceGraph, TargetRegistry};

/// Environment-variable backed defaults shared by every front-end
pub mod defaults;

/// Cancellation token armed on SIGINT
pub mod interrupt;

/// Dispatcher around the client interface executable
pub mod client;

/// Local package store operations
pub mod store;

/// The local snapshot store under `DYSNOMIA_STATEDIR`
pub mod statedir;

/// The parallel fork-and-wait task engine
pub mod executor;

/// Closure and snapshot transfer primitives
pub mod copy;

/// Distribution stage
pub mod distribute;

/// Fleet-wide profile locking
pub mod locking;

/// Diffing and the staged transition engine
pub mod transition;

/// Snapshot migration for moved services
pub mod migrate;

/// Coordinator and target profile bookkeeping
pub mod profiles;

/// The deploy driver composing all stages
pub mod deploy;

/// Fleet queries and maintenance operations
pub mod query;
pub mod collect_garbage;
pub mod delete_state;
pub mod clean_snapshots;
