use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use regex::Regex;

use super::graph::ServiceGraph;
use super::infrastructure::Target;
use super::structs::{DistributionMapping, Service, ServiceMapping, SnapshotMapping};
use super::Result;

/// Selects which manifest subsections to materialize.
///
/// Pure-distribution phases do not need the snapshot mappings and the lock
/// tool does not need the service catalogue; loading with a narrower
/// selection discards the rest after parse and skips their invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections {
    pub services: bool,
    pub infrastructure: bool,
    pub distribution: bool,
    pub service_mappings: bool,
    pub snapshot_mappings: bool,
}

impl Sections {
    pub fn all() -> Sections {
        Sections {
            services: true,
            infrastructure: true,
            distribution: true,
            service_mappings: true,
            snapshot_mappings: true,
        }
    }

    /// Enough to distribute closures and drive the locking protocol
    pub fn distribution_only() -> Sections {
        Sections {
            services: false,
            infrastructure: true,
            distribution: true,
            service_mappings: false,
            snapshot_mappings: false,
        }
    }

    /// Enough to compute and order a transition, minus state migration
    pub fn mappings_only() -> Sections {
        Sections {
            services: true,
            infrastructure: true,
            distribution: false,
            service_mappings: true,
            snapshot_mappings: false,
        }
    }
}

/// Main manifest, deserializable from the XML document the evaluator emits.
///
/// The manifest is read-only for the duration of a deployment; nothing in
/// the orchestrator mutates it after `load` has accepted it.
#[derive(Deserialize, Clone, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(rename = "@version", default)]
    pub version: Option<String>,

    /// The service catalogue
    #[serde(default)]
    pub services: Services,

    /// All managed machines and their containers
    #[serde(default)]
    pub infrastructure: ManifestInfrastructure,

    /// Which per-target profile goes to which machine
    #[serde(default)]
    pub distribution: Distribution,

    /// The deployment's extensional meaning: service to target to container
    #[serde(default)]
    pub serviceMappings: ServiceMappings,

    /// Which deployed services own mutable state
    #[serde(default)]
    pub snapshotMappings: SnapshotMappings,
}

#[derive(Deserialize, Clone, Default, Debug, PartialEq)]
pub struct Services {
    #[serde(default)]
    pub service: Vec<Service>,
}

#[derive(Deserialize, Clone, Default, Debug, PartialEq)]
pub struct ManifestInfrastructure {
    #[serde(default)]
    pub target: Vec<Target>,
}

#[derive(Deserialize, Clone, Default, Debug, PartialEq)]
pub struct Distribution {
    #[serde(default)]
    pub mapping: Vec<DistributionMapping>,
}

#[derive(Deserialize, Clone, Default, Debug, PartialEq)]
pub struct ServiceMappings {
    #[serde(default)]
    pub mapping: Vec<ServiceMapping>,
}

#[derive(Deserialize, Clone, Default, Debug, PartialEq)]
pub struct SnapshotMappings {
    #[serde(default)]
    pub mapping: Vec<SnapshotMapping>,
}

impl Manifest {
    /// Load and validate a manifest document.
    ///
    /// Produces a fatal single-line diagnostic on a missing file, malformed
    /// XML or an invariant violation; no partial manifest is ever returned.
    pub fn load(path: &Path, sections: Sections) -> Result<Manifest> {
        let data = fs::read_to_string(path)
            .map_err(|e| format_err!("cannot open manifest {}: {}", path.display(), e))?;
        let mut manifest: Manifest = quick_xml::de::from_str(&data)
            .map_err(|e| format_err!("malformed manifest {}: {}", path.display(), e))?;
        manifest.retain(sections);
        manifest.check(sections)?;
        Ok(manifest)
    }

    /// Parse a manifest from a string, without validation. Used by tooling
    /// that wants to inspect a document it does not intend to deploy.
    pub fn parse(data: &str) -> Result<Manifest> {
        let manifest: Manifest = quick_xml::de::from_str(data)
            .map_err(|e| format_err!("malformed manifest: {}", e))?;
        Ok(manifest)
    }

    fn retain(&mut self, sections: Sections) {
        if !sections.services {
            self.services.service.clear();
        }
        if !sections.infrastructure {
            self.infrastructure.target.clear();
        }
        if !sections.distribution {
            self.distribution.mapping.clear();
        }
        if !sections.service_mappings {
            self.serviceMappings.mapping.clear();
        }
        if !sections.snapshot_mappings {
            self.snapshotMappings.mapping.clear();
        }
    }

    /// Validate the structural invariants of the materialized sections.
    pub fn check(&self, sections: Sections) -> Result<()> {
        let catalogue = self.services_table();
        let store_re = Regex::new(r"^/nix/store/[0-9a-z]+").unwrap();

        if sections.services {
            for svc in &self.services.service {
                if svc.key.is_empty() || svc.name.is_empty() {
                    bail!("service catalogue entry without a key or name");
                }
                if !svc.pkg.starts_with('/') {
                    bail!("service {} has a relative store path: {}", svc.key, svc.pkg);
                }
                if !store_re.is_match(&svc.pkg) {
                    warn!("service {} has an unusual store path: {}", svc.key, svc.pkg);
                }
            }
            // dangling inter-dependencies and cycles are both fatal
            let graph = ServiceGraph::build(&self.services.service)?;
            graph.check_acyclic()?;
        }

        let targets: HashSet<&str> = self.infrastructure.target.iter().map(|t| t.name.as_str()).collect();

        if sections.service_mappings {
            for m in &self.serviceMappings.mapping {
                if sections.services && !catalogue.contains_key(m.service.as_str()) {
                    bail!("mapping refers to unknown service {}", m.service);
                }
                if sections.infrastructure {
                    let tgt = self
                        .infrastructure
                        .target
                        .iter()
                        .find(|t| t.name == m.target)
                        .ok_or_else(|| format_err!("mapping of {} refers to unknown target {}", m.service, m.target))?;
                    if !tgt.containers.container.iter().any(|c| c.name == m.container) {
                        bail!("target {} has no container {} for service {}", m.target, m.container, m.service);
                    }
                }
            }
        }

        if sections.snapshot_mappings {
            for m in &self.snapshotMappings.mapping {
                if sections.services && !catalogue.contains_key(m.service.as_str()) {
                    bail!("snapshot mapping refers to unknown service {}", m.service);
                }
                if sections.infrastructure && !targets.contains(m.target.as_str()) {
                    bail!("snapshot mapping of {} refers to unknown target {}", m.service, m.target);
                }
            }
            // every mapping that claims mutable state needs snapshot coverage
            if sections.services && sections.service_mappings {
                for m in &self.serviceMappings.mapping {
                    let stateful = catalogue.get(m.service.as_str()).map(|s| s.stateful).unwrap_or(false);
                    if stateful && self.snapshot_for(&m.service, &m.target, &m.container).is_none() {
                        bail!("stateful service {} on target {} has no snapshot mapping", m.service, m.target);
                    }
                }
            }
        }

        if sections.distribution && sections.infrastructure {
            for d in &self.distribution.mapping {
                if !targets.contains(d.target.as_str()) {
                    bail!("distribution refers to unknown target {}", d.target);
                }
            }
        }

        Ok(())
    }

    /// The service catalogue indexed by key
    pub fn services_table(&self) -> HashMap<&str, &Service> {
        self.services.service.iter().map(|s| (s.key.as_str(), s)).collect()
    }

    pub fn service(&self, key: &str) -> Option<&Service> {
        self.services.service.iter().find(|s| s.key == key)
    }

    /// Find a catalogue entry by human name
    pub fn service_by_name(&self, name: &str) -> Option<&Service> {
        self.services.service.iter().find(|s| s.name == name)
    }

    /// The snapshot mapping covering one deployed service, if any
    pub fn snapshot_for(&self, service: &str, target: &str, container: &str) -> Option<&SnapshotMapping> {
        self.snapshotMappings
            .mapping
            .iter()
            .find(|m| m.service == service && m.target == target && m.container == container)
    }

    /// Compare two manifests for deployment equality.
    ///
    /// Section ordering is not significant, so everything is compared after
    /// canonical sorting.
    pub fn equivalent(&self, other: &Manifest) -> bool {
        self.canonical() == other.canonical()
    }

    fn canonical(&self) -> Manifest {
        let mut m = self.clone();
        m.services.service.sort_by(|a, b| a.key.cmp(&b.key));
        m.infrastructure.target.sort_by(|a, b| a.name.cmp(&b.name));
        m.distribution.mapping.sort();
        m.serviceMappings.mapping.sort();
        m.snapshotMappings.mapping.sort();
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(extra_services: &str, mappings: &str, snapshots: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<manifest version="1">
  <services>
    <service>
      <key>aaaa-db</key>
      <name>db</name>
      <pkg>/nix/store/aaaa-db-1.0</pkg>
      <type>mysql-database</type>
      <stateful>true</stateful>
    </service>
    <service>
      <key>bbbb-web</key>
      <name>web</name>
      <pkg>/nix/store/bbbb-web-1.0</pkg>
      <type>process</type>
      <dependsOn>
        <dependency>aaaa-db</dependency>
      </dependsOn>
    </service>
    {}
  </services>
  <infrastructure>
    <target>
      <name>test1</name>
      <properties>
        <hostname>test1.example.org</hostname>
      </properties>
      <containers>
        <container>
          <name>process</name>
        </container>
        <container>
          <name>mysql-database</name>
          <properties>
            <mysqlPort>3306</mysqlPort>
          </properties>
        </container>
      </containers>
    </target>
  </infrastructure>
  <distribution>
    <mapping>
      <profile>/nix/store/cccc-default</profile>
      <target>test1</target>
    </mapping>
  </distribution>
  <serviceMappings>
    <mapping>
      <service>bbbb-web</service>
      <target>test1</target>
      <container>process</container>
    </mapping>
    <mapping>
      <service>aaaa-db</service>
      <target>test1</target>
      <container>mysql-database</container>
    </mapping>
    {}
  </serviceMappings>
  <snapshotMappings>
    <mapping>
      <service>aaaa-db</service>
      <component>db</component>
      <container>mysql-database</container>
      <target>test1</target>
    </mapping>
    {}
  </snapshotMappings>
</manifest>"#,
            extra_services, mappings, snapshots
        )
    }

    fn check_all(xml: &str) -> Result<Manifest> {
        let m = Manifest::parse(xml)?;
        m.check(Sections::all())?;
        Ok(m)
    }

    #[test]
    fn parses_a_complete_manifest() {
        let m = check_all(&sample("", "", "")).unwrap();
        assert_eq!(m.services.service.len(), 2);
        assert_eq!(m.serviceMappings.mapping.len(), 2);
        assert_eq!(m.snapshotMappings.mapping.len(), 1);
        let web = m.service("bbbb-web").unwrap();
        assert_eq!(web.dependencies(), ["aaaa-db".to_string()]);
        let db = m.service_by_name("db").unwrap();
        assert!(db.stateful);
        let container = &m.infrastructure.target[0].containers.container[1];
        assert_eq!(container.properties.get("mysqlPort").map(|s| s.as_str()), Some("3306"));
    }

    #[test]
    fn unknown_service_in_mapping_is_rejected() {
        let xml = sample(
            "",
            "<mapping><service>nope</service><target>test1</target><container>process</container></mapping>",
            "",
        );
        assert!(check_all(&xml).is_err());
    }

    #[test]
    fn unknown_container_is_rejected() {
        let xml = sample(
            "",
            "<mapping><service>bbbb-web</service><target>test1</target><container>tomcat</container></mapping>",
            "",
        );
        assert!(check_all(&xml).is_err());
    }

    #[test]
    fn cycles_are_rejected() {
        let xml = sample(
            r#"<service>
                 <key>x</key><name>x</name><pkg>/nix/store/x</pkg><type>process</type>
                 <dependsOn><dependency>y</dependency></dependsOn>
               </service>
               <service>
                 <key>y</key><name>y</name><pkg>/nix/store/y</pkg><type>process</type>
                 <dependsOn><dependency>x</dependency></dependsOn>
               </service>"#,
            "",
            "",
        );
        assert!(check_all(&xml).is_err());
    }

    #[test]
    fn stateful_mapping_without_snapshot_is_rejected() {
        // drop the snapshot section entirely: db is stateful and uncovered
        let xml = sample("", "", "").replace(
            "<service>aaaa-db</service>\n      <component>db</component>",
            "<service>bbbb-web</service>\n      <component>web</component>",
        );
        let m = Manifest::parse(&xml).unwrap();
        // the replacement moved coverage to web's container, leaving db bare
        assert!(m.check(Sections::all()).is_err());
    }

    #[test]
    fn narrow_sections_skip_unrelated_invariants() {
        // distribution-only loads must not trip over service problems
        let xml = sample(
            "",
            "<mapping><service>nope</service><target>test1</target><container>process</container></mapping>",
            "",
        );
        let mut m = Manifest::parse(&xml).unwrap();
        m.retain(Sections::distribution_only());
        assert!(m.check(Sections::distribution_only()).is_ok());
        assert!(m.serviceMappings.mapping.is_empty());
        assert!(!m.distribution.mapping.is_empty());
    }

    #[test]
    fn mappings_only_ignores_snapshot_problems() {
        // a snapshot mapping of an unknown service only matters when the
        // snapshot section is materialized
        let xml = sample(
            "",
            "",
            "<mapping><service>ghost</service><component>g</component><container>process</container><target>test1</target></mapping>",
        );
        let full = Manifest::parse(&xml).unwrap();
        assert!(full.check(Sections::all()).is_err());

        let mut narrow = Manifest::parse(&xml).unwrap();
        narrow.retain(Sections::mappings_only());
        assert!(narrow.check(Sections::mappings_only()).is_ok());
        assert!(narrow.snapshotMappings.mapping.is_empty());
    }

    #[test]
    fn equivalence_ignores_section_order() {
        let a = Manifest::parse(&sample("", "", "")).unwrap();
        let mut b = a.clone();
        b.serviceMappings.mapping.reverse();
        b.services.service.reverse();
        assert!(a.equivalent(&b));

        let mut c = a.clone();
        c.serviceMappings.mapping.pop();
        assert!(!a.equivalent(&c));
    }
}
