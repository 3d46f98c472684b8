use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use super::Result;

/// One managed machine from the infrastructure section.
///
/// ```xml
/// <target>
///   <name>test1</name>
///   <properties>
///     <hostname>test1.example.org</hostname>
///     <system>x86_64-linux</system>
///   </properties>
///   <containers>
///     <container>
///       <name>process</name>
///     </container>
///   </containers>
/// </target>
/// ```
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Target {
    /// Machine key, chosen by the user
    pub name: String,

    /// Property that supplies the connection address for this target
    ///
    /// Overrides the coordinator-wide default (normally `hostname`).
    #[serde(default)]
    pub targetProperty: Option<String>,

    /// Client interface executable to use for this target
    ///
    /// Overrides the coordinator-wide default.
    #[serde(default)]
    pub clientInterface: Option<String>,

    /// Capacity counter used for admission decisions
    #[serde(default)]
    pub numOfCores: Option<u32>,

    /// Free-form machine properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Deployment containers exposed by this machine
    #[serde(default)]
    pub containers: Containers,
}

/// Wrapper for the `containers` element
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
pub struct Containers {
    #[serde(default)]
    pub container: Vec<Container>,
}

/// A named deployment environment on a target
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Container {
    pub name: String,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Root of a standalone infrastructure expression.
///
/// The fleet maintenance tools (garbage collection, snapshot pruning, query)
/// take this instead of a full manifest.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
pub struct Infrastructure {
    #[serde(default)]
    pub target: Vec<Target>,
}

impl Infrastructure {
    /// Load an infrastructure expression from an XML document
    pub fn load(path: &Path) -> Result<Infrastructure> {
        let data = fs::read_to_string(path)
            .map_err(|e| format_err!("cannot open infrastructure model {}: {}", path.display(), e))?;
        let infra: Infrastructure = quick_xml::de::from_str(&data)
            .map_err(|e| format_err!("malformed infrastructure model {}: {}", path.display(), e))?;
        Ok(infra)
    }
}

/// A target record with its connection parameters resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTarget {
    /// Machine key
    pub key: String,
    /// Address handed to the client interface
    pub address: String,
    /// Client interface executable for this target
    pub client_interface: String,
    /// Capacity counter, defaults to one
    pub num_of_cores: u32,
    /// Machine properties
    pub properties: BTreeMap<String, String>,
    /// Container name to container properties
    pub containers: BTreeMap<String, BTreeMap<String, String>>,
}

impl ResolvedTarget {
    pub fn container(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.containers.get(name)
    }
}

/// Index over all targets of a deployment.
///
/// Keyed lookups are O(1); the sorted key list gives canonical iteration
/// order for the fleet tools.
#[derive(Clone, Debug, Default)]
pub struct TargetRegistry {
    table: HashMap<String, ResolvedTarget>,
    keys: Vec<String>,
}

impl TargetRegistry {
    /// Resolve connection info for every target.
    ///
    /// The connection address is rewritten from whichever property the target
    /// (or the coordinator default) selects; a target without that property
    /// is unusable and rejected here rather than at first contact.
    pub fn build(targets: &[Target], default_interface: &str, default_property: &str) -> Result<TargetRegistry> {
        let mut table = HashMap::new();
        let mut keys = Vec::new();

        for t in targets {
            let property = t.targetProperty.as_ref().map(|s| s.as_str()).unwrap_or(default_property);
            let address = match t.properties.get(property) {
                Some(a) => a.clone(),
                None => bail!("target {} has no value for connection property {}", t.name, property),
            };
            let client_interface = t.clientInterface.clone().unwrap_or_else(|| default_interface.to_string());

            let mut containers = BTreeMap::new();
            for c in &t.containers.container {
                containers.insert(c.name.clone(), c.properties.clone());
            }

            let record = ResolvedTarget {
                key: t.name.clone(),
                address,
                client_interface,
                num_of_cores: t.numOfCores.unwrap_or(1),
                properties: t.properties.clone(),
                containers,
            };
            if table.insert(t.name.clone(), record).is_some() {
                bail!("target {} is defined more than once", t.name);
            }
            keys.push(t.name.clone());
        }

        keys.sort();
        Ok(TargetRegistry { table, keys })
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedTarget> {
        self.table.get(key)
    }

    pub fn lookup(&self, key: &str) -> Result<&ResolvedTarget> {
        self.table.get(key).ok_or_else(|| format_err!("unknown target: {}", key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Sorted target keys
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Iterate targets in canonical (sorted key) order
    pub fn iter_canonical(&self) -> impl Iterator<Item = &ResolvedTarget> {
        self.keys.iter().filter_map(move |k| self.table.get(k))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, props: &[(&str, &str)]) -> Target {
        let mut t = Target::default();
        t.name = name.into();
        for (k, v) in props {
            t.properties.insert(k.to_string(), v.to_string());
        }
        t
    }

    #[test]
    fn resolves_address_from_default_property() {
        let targets = vec![target("t1", &[("hostname", "t1.example.org")])];
        let reg = TargetRegistry::build(&targets, "disnix-ssh-client", "hostname").unwrap();
        let t = reg.lookup("t1").unwrap();
        assert_eq!(t.address, "t1.example.org");
        assert_eq!(t.client_interface, "disnix-ssh-client");
        assert_eq!(t.num_of_cores, 1);
    }

    #[test]
    fn target_property_override_wins() {
        let mut t = target("t1", &[("hostname", "a"), ("ip", "10.0.0.1")]);
        t.targetProperty = Some("ip".into());
        let reg = TargetRegistry::build(&[t], "client", "hostname").unwrap();
        assert_eq!(reg.lookup("t1").unwrap().address, "10.0.0.1");
    }

    #[test]
    fn missing_connection_property_is_rejected() {
        let targets = vec![target("t1", &[("system", "x86_64-linux")])];
        assert!(TargetRegistry::build(&targets, "client", "hostname").is_err());
    }

    #[test]
    fn canonical_iteration_is_sorted() {
        let targets = vec![
            target("zeta", &[("hostname", "z")]),
            target("alpha", &[("hostname", "a")]),
        ];
        let reg = TargetRegistry::build(&targets, "client", "hostname").unwrap();
        let order: Vec<_> = reg.iter_canonical().map(|t| t.key.as_str()).collect();
        assert_eq!(order, vec!["alpha", "zeta"]);
    }
}
