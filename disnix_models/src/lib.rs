#![allow(renamed_and_removed_lints)]
#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate quick_xml;
extern crate serde;

#[macro_use]
extern crate log;

extern crate petgraph;
extern crate regex;

#[macro_use] extern crate failure;

pub use failure::Error; //Fail
pub type Result<T> = std::result::Result<T, Error>;

/// Typed entities referenced by the manifest
pub mod structs;

pub mod manifest;
pub use manifest::{Manifest, Sections};

/// Target records and the registry resolved from them
pub mod infrastructure;
pub use infrastructure::{Infrastructure, ResolvedTarget, Target, TargetRegistry};

/// Inter-dependency graph helpers using `petgraph`
pub mod graph;
pub use graph::ServiceGraph;
