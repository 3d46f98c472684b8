/// One service deployed to one container on one target.
///
/// Two mappings are equal iff all three coordinates match; upgrades of the
/// same logical service show up as a remove of the old tuple plus an add of
/// the new one because the service key changes with the store path.
///
/// ```xml
/// <mapping>
///   <service>8b2fdf7bb0a52-web</service>
///   <target>test1</target>
///   <container>process</container>
/// </mapping>
/// ```
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(deny_unknown_fields)]
pub struct ServiceMapping {
    pub service: String,
    pub target: String,
    pub container: String,
}

/// Marks a deployed service whose mutable state lives in a container.
///
/// The component name is what the remote agent's snapshot tooling knows the
/// state by; generations underneath it are opaque to the coordinator.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(deny_unknown_fields)]
pub struct SnapshotMapping {
    pub service: String,
    pub component: String,
    pub container: String,
    pub target: String,
}

/// Distribution of a per-target profile to one target.
///
/// ```xml
/// <mapping>
///   <profile>/nix/store/…-default</profile>
///   <target>test1</target>
/// </mapping>
/// ```
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(deny_unknown_fields)]
pub struct DistributionMapping {
    pub profile: String,
    pub target: String,
}
