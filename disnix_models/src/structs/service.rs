use std::collections::BTreeMap;

/// An immutable service artifact from the catalogue.
///
/// The store path is the identity used for distribution; the key is what
/// mappings and inter-dependencies refer to. Two manifest generations that
/// ship different builds of the same logical service therefore carry two
/// different keys but the same human `name`.
///
/// ```xml
/// <service>
///   <key>8b2fdf7bb0a52-web</key>
///   <name>web</name>
///   <pkg>/nix/store/8b2fdf7bb0a52…-web-1.0</pkg>
///   <type>process</type>
///   <dependsOn>
///     <dependency>41ac91b2ff8e1-db</dependency>
///   </dependsOn>
/// </service>
/// ```
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Service {
    /// Catalogue key referenced by mappings and inter-dependencies
    pub key: String,

    /// Human name of the service
    pub name: String,

    /// Content-addressed store path of the artifact
    pub pkg: String,

    /// Activation module understood by the remote agent
    ///
    /// ```xml
    /// <type>mysql-database</type>
    /// ```
    #[serde(rename = "type")]
    pub activation_type: String,

    /// Whether the service owns mutable state that must travel on moves
    ///
    /// Every mapping of a stateful service must be covered by a snapshot
    /// mapping; this is enforced at manifest validation.
    #[serde(default)]
    pub stateful: bool,

    /// Inter-dependencies on other services, by catalogue key
    ///
    /// Used to construct the activation ordering graph. Cycles are rejected
    /// when the manifest is validated.
    #[serde(default)]
    pub dependsOn: DependsOn,

    /// Property bindings passed verbatim to the activation module
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Wrapper for the `dependsOn` element
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
pub struct DependsOn {
    #[serde(default)]
    pub dependency: Vec<String>,
}

impl Service {
    /// Keys of the services this one inter-depends on
    pub fn dependencies(&self) -> &[String] {
        &self.dependsOn.dependency
    }
}
