#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::symlink;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// A scratch deployment environment: a stub client interface that records
/// every invocation, a stub package store, and empty coordinator and
/// snapshot state directories.
pub struct Fixture {
    _dir: tempfile::TempDir,
    pub root: PathBuf,
    pub bin: PathBuf,
    pub log: PathBuf,
    pub client: PathBuf,
    pub coordinator: PathBuf,
    pub statedir: PathBuf,
}

const CLIENT_STUB: &str = r#"#!/bin/sh
# Records every invocation and answers query verbs with canned data.
shift
address="$1"; shift
verb="$1"; shift

echo "$address $verb $*" >> "$DISNIX_STUB_LOG"

if [ -n "$DISNIX_STUB_SLEEP" ]; then
    case "$address $verb" in
        *"$DISNIX_STUB_SLEEP"*) sleep "${DISNIX_STUB_SLEEP_SECS:-2}" ;;
    esac
fi
if [ -n "$DISNIX_STUB_FAIL" ]; then
    case "$address $verb $*" in
        *"$DISNIX_STUB_FAIL"*) exit 1 ;;
    esac
fi

case "$verb" in
    print-invalid)
        for p in "$@"; do echo "$p"; done ;;
    import)
        cat > /dev/null ;;
    export)
        printf 'ARCHIVE' ;;
    query-requisites)
        for p in "$@"; do echo "$p"; done ;;
    query-latest-snapshot|query-all-snapshots)
        echo "$1/$2/1" ;;
    print-missing-snapshots)
        for p in "$@"; do echo "$p"; done ;;
    resolve-snapshots)
        for p in "$@"; do echo "/remote/$p"; done ;;
esac
exit 0
"#;

const NIX_STORE_STUB: &str = r#"#!/bin/sh
echo "nix-store $*" >> "$DISNIX_STUB_LOG"
case "$1" in
    --query)
        shift; shift
        for p in "$@"; do echo "$p"; done ;;
    --export)
        printf 'NAR' ;;
    --import)
        cat > /dev/null ;;
    --check-validity)
        exit 1 ;;
esac
exit 0
"#;

fn write_executable(path: &Path, content: &str) {
    let mut f = File::create(path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

impl Fixture {
    pub fn new() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let bin = root.join("bin");
        fs::create_dir_all(&bin).unwrap();

        let log = root.join("invocations.log");
        fs::write(&log, "").unwrap();

        let client = bin.join("client-interface");
        write_executable(&client, CLIENT_STUB);
        write_executable(&bin.join("nix-store"), NIX_STORE_STUB);

        // the distribution stage forks the real copy tool from PATH
        symlink(env!("CARGO_BIN_EXE_disnix-copy-closure"), bin.join("disnix-copy-closure")).unwrap();

        let coordinator = root.join("coordinator");
        let statedir = root.join("dysnomia-state");
        fs::create_dir_all(&statedir).unwrap();

        Fixture {
            _dir: dir,
            root,
            bin,
            log,
            client,
            coordinator,
            statedir,
        }
    }

    pub fn write_manifest(&self, name: &str, xml: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, xml).unwrap();
        path
    }

    pub fn command(&self, exe: &str) -> Command {
        let path = format!(
            "{}:{}",
            self.bin.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let mut cmd = Command::new(exe);
        cmd.env("PATH", path)
            .env("DISNIX_CLIENT_INTERFACE", &self.client)
            .env("DISNIX_STUB_LOG", &self.log)
            .env("DYSNOMIA_STATEDIR", &self.statedir)
            .env_remove("DISNIX_DELETE_STATE")
            .env_remove("DISNIX_PROFILE")
            .env_remove("DISNIX_TARGET_PROPERTY")
            .env_remove("DISNIX_STUB_FAIL")
            .env_remove("DISNIX_STUB_SLEEP");
        cmd
    }

    pub fn run(&self, exe: &str, args: &[&str]) -> Output {
        let mut cmd = self.command(exe);
        cmd.args(args);
        cmd.output().unwrap()
    }

    pub fn clear_log(&self) {
        fs::write(&self.log, "").unwrap();
    }

    pub fn log_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    /// Client verbs recorded for one address, in invocation order
    pub fn verbs_for(&self, address: &str) -> Vec<String> {
        self.log_lines()
            .iter()
            .filter_map(|l| {
                let mut words = l.split_whitespace();
                match words.next() {
                    Some(a) if a == address => words.next().map(String::from),
                    _ => None,
                }
            })
            .collect()
    }

    /// Position of the first log line containing all given needles
    pub fn position(&self, needles: &[&str]) -> Option<usize> {
        self.log_lines()
            .iter()
            .position(|l| needles.iter().all(|n| l.contains(n)))
    }

    pub fn generation_count(&self, profile: &str) -> usize {
        match fs::read_dir(&self.coordinator) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let name = e.file_name();
                    let name = name.to_string_lossy().to_string();
                    name.starts_with(&format!("{}-", profile)) && name.ends_with("-link")
                })
                .count(),
            Err(_) => 0,
        }
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// One service on one machine, no state
pub fn fresh_manifest() -> String {
    r#"<?xml version="1.0"?>
<manifest version="1">
  <services>
    <service>
      <key>bbbb-web</key>
      <name>web</name>
      <pkg>/nix/store/bbbb-web-1.0</pkg>
      <type>process</type>
    </service>
  </services>
  <infrastructure>
    <target>
      <name>t1</name>
      <properties>
        <hostname>t1.example.org</hostname>
      </properties>
      <containers>
        <container>
          <name>process</name>
        </container>
      </containers>
    </target>
  </infrastructure>
  <distribution>
    <mapping>
      <profile>/nix/store/cccc-default</profile>
      <target>t1</target>
    </mapping>
  </distribution>
  <serviceMappings>
    <mapping>
      <service>bbbb-web</service>
      <target>t1</target>
      <container>process</container>
    </mapping>
  </serviceMappings>
</manifest>"#
        .to_string()
}

/// Two services with an inter-dependency, both on one machine
pub fn chain_manifest() -> String {
    r#"<?xml version="1.0"?>
<manifest version="1">
  <services>
    <service>
      <key>aaaa-db</key>
      <name>db</name>
      <pkg>/nix/store/aaaa-db-1.0</pkg>
      <type>process</type>
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
  </services>
  <infrastructure>
    <target>
      <name>t1</name>
      <properties>
        <hostname>t1.example.org</hostname>
      </properties>
      <containers>
        <container>
          <name>process</name>
        </container>
      </containers>
    </target>
  </infrastructure>
  <distribution>
    <mapping>
      <profile>/nix/store/cccc-default</profile>
      <target>t1</target>
    </mapping>
  </distribution>
  <serviceMappings>
    <mapping>
      <service>aaaa-db</service>
      <target>t1</target>
      <container>process</container>
    </mapping>
    <mapping>
      <service>bbbb-web</service>
      <target>t1</target>
      <container>process</container>
    </mapping>
  </serviceMappings>
</manifest>"#
        .to_string()
}

/// A stateful database plus a stateless frontend over two machines; the
/// database sits on `db_target`.
pub fn move_manifest(db_target: &str) -> String {
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
  </services>
  <infrastructure>
    <target>
      <name>t1</name>
      <properties>
        <hostname>t1.example.org</hostname>
      </properties>
      <containers>
        <container>
          <name>process</name>
        </container>
        <container>
          <name>mysql-database</name>
        </container>
      </containers>
    </target>
    <target>
      <name>t2</name>
      <properties>
        <hostname>t2.example.org</hostname>
      </properties>
      <containers>
        <container>
          <name>process</name>
        </container>
        <container>
          <name>mysql-database</name>
        </container>
      </containers>
    </target>
  </infrastructure>
  <distribution>
    <mapping>
      <profile>/nix/store/cccc-default</profile>
      <target>t1</target>
    </mapping>
    <mapping>
      <profile>/nix/store/dddd-default</profile>
      <target>t2</target>
    </mapping>
  </distribution>
  <serviceMappings>
    <mapping>
      <service>aaaa-db</service>
      <target>{db}</target>
      <container>mysql-database</container>
    </mapping>
    <mapping>
      <service>bbbb-web</service>
      <target>t1</target>
      <container>process</container>
    </mapping>
  </serviceMappings>
  <snapshotMappings>
    <mapping>
      <service>aaaa-db</service>
      <component>db</component>
      <container>mysql-database</container>
      <target>{db}</target>
    </mapping>
  </snapshotMappings>
</manifest>"#,
        db = db_target
    )
}

/// Five machines, no services; enough for the locking protocol
pub fn fleet_manifest() -> String {
    let mut targets = String::new();
    let mut distribution = String::new();
    for (i, host) in [
        (1, "t1.example.org"),
        (2, "t2.example.org"),
        (3, "t3.example.org"),
        (4, "slow4.example.org"),
        (5, "slow5.example.org"),
    ]
    .iter()
    {
        targets.push_str(&format!(
            "<target><name>t{i}</name><properties><hostname>{host}</hostname></properties>\
             <containers><container><name>process</name></container></containers></target>",
            i = i,
            host = host
        ));
        distribution.push_str(&format!(
            "<mapping><profile>/nix/store/prof{i}-default</profile><target>t{i}</target></mapping>",
            i = i
        ));
    }
    format!(
        r#"<?xml version="1.0"?>
<manifest version="1">
  <infrastructure>{}</infrastructure>
  <distribution>{}</distribution>
</manifest>"#,
        targets, distribution
    )
}
