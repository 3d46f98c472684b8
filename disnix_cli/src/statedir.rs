use std::fs::{self, File};
use std::path::{Path, PathBuf};

use super::defaults;
use super::Result;

/// The coordinator-side snapshot store.
///
/// Snapshot identifiers are opaque strings minted by the remote agent; the
/// store only ever joins them under its root, it never interprets them. An
/// identifier that is already present is never rewritten, which is what
/// makes snapshot transfers idempotent.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn open(root: PathBuf) -> SnapshotStore {
        SnapshotStore { root }
    }

    pub fn from_env() -> SnapshotStore {
        SnapshotStore::open(defaults::statedir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn checked_join(&self, id: &str) -> Result<PathBuf> {
        if id.starts_with('/') || id.split('/').any(|c| c == "..") {
            bail!("refusing snapshot identifier escaping the state directory: {}", id);
        }
        Ok(self.root.join(id))
    }

    /// The subset of identifiers not present locally
    pub fn missing(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for id in ids {
            if !self.checked_join(id)?.exists() {
                out.push(id.clone());
            }
        }
        Ok(out)
    }

    /// Local paths for identifiers, whether present or not
    pub fn resolve(&self, ids: &[String]) -> Result<Vec<PathBuf>> {
        ids.iter().map(|id| self.checked_join(id)).collect()
    }

    /// Open a local snapshot archive for streaming to a target
    pub fn read(&self, id: &str) -> Result<File> {
        let path = self.checked_join(id)?;
        File::open(&path).map_err(|e| format_err!("cannot open snapshot {}: {}", path.display(), e))
    }

    /// Stage an incoming snapshot archive.
    ///
    /// The archive is written next to its final location and only renamed
    /// into place once complete, so a crash mid-transfer never leaves a
    /// half-written generation behind.
    pub fn stage(&self, id: &str) -> Result<StagedSnapshot> {
        let path = self.checked_join(id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = path.with_extension("partial");
        let file = File::create(&partial)
            .map_err(|e| format_err!("cannot stage snapshot {}: {}", partial.display(), e))?;
        Ok(StagedSnapshot { file, partial, path })
    }

    /// Identifiers stored locally for one component in one container.
    ///
    /// Identifiers are reconstructed as `container/component/generation`
    /// from the directory layout the transfers created; the generation part
    /// itself stays opaque.
    pub fn local_snapshots(&self, container: &str, component: &str) -> Result<Vec<String>> {
        let dir = self.root.join(container).join(component);
        let mut out = Vec::new();
        if dir.is_dir() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.ends_with(".partial") {
                    continue;
                }
                out.push(format!("{}/{}/{}", container, component, name));
            }
        }
        out.sort();
        Ok(out)
    }
}

/// A snapshot archive being written; commit renames it into place.
pub struct StagedSnapshot {
    pub file: File,
    partial: PathBuf,
    path: PathBuf,
}

impl StagedSnapshot {
    pub fn commit(self) -> Result<()> {
        let StagedSnapshot { file, partial, path } = self;
        drop(file);
        fs::rename(&partial, &path)
            .map_err(|e| format_err!("cannot commit snapshot {}: {}", path.display(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn staging_commits_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().to_path_buf());

        let mut staged = store.stage("mysql-database/db/1").unwrap();
        staged.file.write_all(b"snapshot").unwrap();
        assert!(store.missing(&["mysql-database/db/1".to_string()]).unwrap().len() == 1);
        staged.commit().unwrap();

        assert!(store.missing(&["mysql-database/db/1".to_string()]).unwrap().is_empty());
        assert_eq!(
            store.local_snapshots("mysql-database", "db").unwrap(),
            vec!["mysql-database/db/1".to_string()]
        );
    }

    #[test]
    fn escaping_identifiers_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().to_path_buf());
        assert!(store.missing(&["../outside".to_string()]).is_err());
        assert!(store.resolve(&["/etc/passwd".to_string()]).is_err());
    }

    #[test]
    fn partial_files_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().to_path_buf());
        let staged = store.stage("c/x/5").unwrap();
        drop(staged);
        assert!(store.local_snapshots("c", "x").unwrap().is_empty());
    }
}
