/// Service catalogue entries
mod service;
pub use self::service::{DependsOn, Service};

/// The three mapping kinds held by a manifest
mod mapping;
pub use self::mapping::{DistributionMapping, ServiceMapping, SnapshotMapping};
